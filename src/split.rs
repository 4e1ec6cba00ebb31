// Split Calculator & Validator
// Turns an expense amount + split specification into concrete per-member
// shares, and enforces the sum/positivity rules per split type before any
// ledger mutation happens.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Accepted drift between a share sum and its target (total amount for
/// EXACT, 100 for PERCENTAGE).
pub const SUM_TOLERANCE: f64 = 0.01;

// ============================================================================
// SPLIT TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SplitType {
    Equal,
    Exact,
    Percentage,
}

impl SplitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitType::Equal => "EQUAL",
            SplitType::Exact => "EXACT",
            SplitType::Percentage => "PERCENTAGE",
        }
    }

    /// Parse the wire form. Anything outside the three enumerated types is
    /// a validation failure, not a panic or a silent default.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "EQUAL" => Ok(SplitType::Equal),
            "EXACT" => Ok(SplitType::Exact),
            "PERCENTAGE" => Ok(SplitType::Percentage),
            _ => Err(AppError::validation("Invalid split type")),
        }
    }
}

// ============================================================================
// SPLIT SPECIFICATION
// ============================================================================

/// One raw split entry as supplied by the caller. Which optional field is
/// required depends on the split type; `SplitSpec::from_request` resolves
/// that before anything else runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitInput {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub amount: Option<f64>,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExactShare {
    pub user_id: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PercentageShare {
    pub user_id: String,
    pub percentage: f64,
}

/// Tagged split specification: one variant per split type, so a share
/// entry can never carry the wrong field for its type past this point.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitSpec {
    /// Split equally; an empty participant list means the whole group.
    Equal { participants: Vec<String> },
    Exact(Vec<ExactShare>),
    Percentage(Vec<PercentageShare>),
}

impl SplitSpec {
    /// Resolve the wire shape (split type + optional entry list) into the
    /// tagged form, rejecting entries that are missing the field their
    /// split type requires.
    pub fn from_request(split_type: SplitType, splits: &[SplitInput]) -> Result<SplitSpec> {
        match split_type {
            SplitType::Equal => Ok(SplitSpec::Equal {
                participants: splits.iter().map(|s| s.user_id.clone()).collect(),
            }),
            SplitType::Exact => {
                let mut shares = Vec::with_capacity(splits.len());
                for split in splits {
                    let amount = split.amount.ok_or_else(|| {
                        AppError::validation("All splits must have amount for EXACT split type")
                    })?;
                    shares.push(ExactShare {
                        user_id: split.user_id.clone(),
                        amount,
                    });
                }
                Ok(SplitSpec::Exact(shares))
            }
            SplitType::Percentage => {
                let mut shares = Vec::with_capacity(splits.len());
                for split in splits {
                    let percentage = split.percentage.ok_or_else(|| {
                        AppError::validation(
                            "All splits must have percentage for PERCENTAGE split type",
                        )
                    })?;
                    shares.push(PercentageShare {
                        user_id: split.user_id.clone(),
                        percentage,
                    });
                }
                Ok(SplitSpec::Percentage(shares))
            }
        }
    }

    pub fn split_type(&self) -> SplitType {
        match self {
            SplitSpec::Equal { .. } => SplitType::Equal,
            SplitSpec::Exact(_) => SplitType::Exact,
            SplitSpec::Percentage(_) => SplitType::Percentage,
        }
    }
}

// ============================================================================
// SHARES
// ============================================================================

/// A member's computed monetary share of an expense. The uniform shape all
/// three split types resolve to before validation and ledger application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Share {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Compute concrete shares for a total of `total`.
///
/// EQUAL splits are computed in integer cents so the shares always sum to
/// the total exactly. When the division leaves a remainder, the leftover
/// cents land on the payer's share if the payer participates, otherwise on
/// the first participant.
pub fn calculate_shares(
    total: f64,
    spec: &SplitSpec,
    group_members: &[String],
    paid_by: &str,
) -> Result<Vec<Share>> {
    match spec {
        SplitSpec::Equal { participants } => {
            let participants: Vec<String> = if participants.is_empty() {
                group_members.to_vec()
            } else {
                participants.clone()
            };

            if participants.is_empty() {
                return Err(AppError::validation("At least one split is required"));
            }

            let total_cents = to_cents(total);
            let n = participants.len() as i64;
            let base = total_cents / n;
            let remainder = total_cents - base * n;

            let remainder_idx = participants
                .iter()
                .position(|u| u == paid_by)
                .unwrap_or(0);

            Ok(participants
                .iter()
                .enumerate()
                .map(|(i, user_id)| {
                    let cents = if i == remainder_idx { base + remainder } else { base };
                    Share {
                        user_id: user_id.clone(),
                        amount: cents as f64 / 100.0,
                        percentage: None,
                    }
                })
                .collect())
        }
        SplitSpec::Exact(shares) => Ok(shares
            .iter()
            .map(|s| Share {
                user_id: s.user_id.clone(),
                amount: s.amount,
                percentage: None,
            })
            .collect()),
        SplitSpec::Percentage(shares) => Ok(shares
            .iter()
            .map(|s| Share {
                user_id: s.user_id.clone(),
                amount: (total * s.percentage) / 100.0,
                percentage: Some(s.percentage),
            })
            .collect()),
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// Validate computed shares against the split type's invariant.
///
/// Runs before any mutation; a failure here never leaves a partial write.
pub fn validate_shares(total: f64, split_type: SplitType, shares: &[Share]) -> Result<()> {
    if shares.is_empty() {
        return Err(AppError::validation("At least one split is required"));
    }

    if split_type == SplitType::Exact {
        let sum: f64 = shares.iter().map(|s| s.amount).sum();
        if (sum - total).abs() > SUM_TOLERANCE {
            return Err(AppError::validation("Split amounts must sum to total amount"));
        }
    }

    if split_type == SplitType::Percentage {
        let sum: f64 = shares.iter().map(|s| s.percentage.unwrap_or(0.0)).sum();
        if (sum - 100.0).abs() > SUM_TOLERANCE {
            return Err(AppError::validation("Split percentages must sum to 100"));
        }
    }

    if shares.iter().any(|s| s.amount < 0.0) {
        return Err(AppError::validation("Split amounts must be positive"));
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn members(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_type_parse() {
        assert_eq!(SplitType::parse("EQUAL").unwrap(), SplitType::Equal);
        assert_eq!(SplitType::parse("EXACT").unwrap(), SplitType::Exact);
        assert_eq!(SplitType::parse("PERCENTAGE").unwrap(), SplitType::Percentage);

        let err = SplitType::parse("WEIGHTED").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Invalid split type");

        // round-trips through as_str
        assert_eq!(SplitType::parse(SplitType::Equal.as_str()).unwrap(), SplitType::Equal);
    }

    #[test]
    fn test_equal_split_exact_division() {
        let spec = SplitSpec::Equal { participants: vec![] };
        let shares =
            calculate_shares(30.0, &spec, &members(&["a", "b", "c"]), "a").unwrap();

        assert_eq!(shares.len(), 3);
        for share in &shares {
            assert_eq!(share.amount, 10.0);
        }
    }

    #[test]
    fn test_equal_split_remainder_goes_to_payer() {
        let spec = SplitSpec::Equal { participants: vec![] };
        let shares =
            calculate_shares(100.0, &spec, &members(&["a", "b", "c"]), "b").unwrap();

        let by_user = |id: &str| shares.iter().find(|s| s.user_id == id).unwrap().amount;
        assert_eq!(by_user("a"), 33.33);
        assert_eq!(by_user("b"), 33.34, "payer absorbs the remainder cent");
        assert_eq!(by_user("c"), 33.33);

        let sum: f64 = shares.iter().map(|s| s.amount).sum();
        assert!((sum - 100.0).abs() < 1e-9, "shares must conserve the total exactly");
    }

    #[test]
    fn test_equal_split_remainder_without_payer_goes_to_first() {
        // Payer not among the participants: leftover cents land on the
        // first participant instead.
        let spec = SplitSpec::Equal {
            participants: members(&["b", "c", "d"]),
        };
        let shares = calculate_shares(100.0, &spec, &members(&["a", "b", "c", "d"]), "a").unwrap();

        assert_eq!(shares[0].user_id, "b");
        assert_eq!(shares[0].amount, 33.34);
        assert_eq!(shares[1].amount, 33.33);
        assert_eq!(shares[2].amount, 33.33);
    }

    #[test]
    fn test_equal_split_conservation_over_many_totals() {
        let spec = SplitSpec::Equal { participants: vec![] };
        let group = members(&["a", "b", "c", "d", "e", "f", "g"]);

        for cents in [1i64, 7, 99, 100, 1000, 12345, 99999] {
            let total = cents as f64 / 100.0;
            let shares = calculate_shares(total, &spec, &group, "c").unwrap();
            let sum_cents: i64 = shares.iter().map(|s| (s.amount * 100.0).round() as i64).sum();
            assert_eq!(sum_cents, cents, "conservation failed for total {}", total);
        }
    }

    #[test]
    fn test_equal_split_with_explicit_participants() {
        let spec = SplitSpec::Equal {
            participants: members(&["a", "b"]),
        };
        let shares =
            calculate_shares(50.0, &spec, &members(&["a", "b", "c", "d"]), "a").unwrap();

        assert_eq!(shares.len(), 2, "explicit list overrides the group member list");
        assert_eq!(shares[0].amount, 25.0);
        assert_eq!(shares[1].amount, 25.0);
    }

    #[test]
    fn test_equal_split_empty_group_rejected() {
        let spec = SplitSpec::Equal { participants: vec![] };
        let err = calculate_shares(10.0, &spec, &[], "a").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_exact_validation_tolerance() {
        let shares = vec![
            Share { user_id: "a".into(), amount: 10.0, percentage: None },
            Share { user_id: "b".into(), amount: 20.005, percentage: None },
        ];

        // 30.005 vs 30.00 is inside the 0.01 tolerance
        validate_shares(30.0, SplitType::Exact, &shares).unwrap();

        // a full unit off is not
        let err = validate_shares(31.0, SplitType::Exact, &shares).unwrap_err();
        assert_eq!(err.to_string(), "Split amounts must sum to total amount");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_percentage_validation_tolerance() {
        let make = |p1: f64, p2: f64| {
            vec![
                Share { user_id: "a".into(), amount: 0.0, percentage: Some(p1) },
                Share { user_id: "b".into(), amount: 0.0, percentage: Some(p2) },
            ]
        };

        validate_shares(100.0, SplitType::Percentage, &make(60.0, 40.0)).unwrap();
        validate_shares(100.0, SplitType::Percentage, &make(60.0, 40.005)).unwrap();

        let err = validate_shares(100.0, SplitType::Percentage, &make(60.0, 30.0)).unwrap_err();
        assert_eq!(err.to_string(), "Split percentages must sum to 100");
    }

    #[test]
    fn test_percentage_shares_computed_from_total() {
        let spec = SplitSpec::Percentage(vec![
            PercentageShare { user_id: "a".into(), percentage: 60.0 },
            PercentageShare { user_id: "b".into(), percentage: 40.0 },
        ]);
        let shares = calculate_shares(250.0, &spec, &[], "a").unwrap();

        assert_eq!(shares[0].amount, 150.0);
        assert_eq!(shares[0].percentage, Some(60.0));
        assert_eq!(shares[1].amount, 100.0);
    }

    #[test]
    fn test_negative_share_rejected() {
        let shares = vec![
            Share { user_id: "a".into(), amount: 40.0, percentage: None },
            Share { user_id: "b".into(), amount: -10.0, percentage: None },
        ];

        let err = validate_shares(30.0, SplitType::Exact, &shares).unwrap_err();
        assert_eq!(err.to_string(), "Split amounts must be positive");
    }

    #[test]
    fn test_empty_share_list_rejected() {
        let err = validate_shares(30.0, SplitType::Exact, &[]).unwrap_err();
        assert_eq!(err.to_string(), "At least one split is required");
    }

    #[test]
    fn test_from_request_exact_requires_amount() {
        let splits = vec![SplitInput { user_id: "a".into(), amount: None, percentage: Some(50.0) }];

        let err = SplitSpec::from_request(SplitType::Exact, &splits).unwrap_err();
        assert_eq!(err.to_string(), "All splits must have amount for EXACT split type");
    }

    #[test]
    fn test_from_request_percentage_requires_percentage() {
        let splits = vec![SplitInput { user_id: "a".into(), amount: Some(10.0), percentage: None }];

        let err = SplitSpec::from_request(SplitType::Percentage, &splits).unwrap_err();
        assert_eq!(
            err.to_string(),
            "All splits must have percentage for PERCENTAGE split type"
        );
    }

    #[test]
    fn test_from_request_equal_keeps_participants() {
        let splits = vec![
            SplitInput { user_id: "a".into(), amount: None, percentage: None },
            SplitInput { user_id: "b".into(), amount: None, percentage: None },
        ];

        let spec = SplitSpec::from_request(SplitType::Equal, &splits).unwrap();
        assert_eq!(
            spec,
            SplitSpec::Equal { participants: members(&["a", "b"]) }
        );
        assert_eq!(spec.split_type(), SplitType::Equal);
    }
}
