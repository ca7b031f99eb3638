//! PSI→GPH leak-flow calculator.
//!
//! Maps a line's operating pressure to the leak-detection flow threshold
//! using an ordered calibration table: exact match first, then linear
//! interpolation between the neighbouring points, clamping to the table's
//! ends outside its range. All arithmetic is done in `rust_decimal::Decimal`;
//! interpolated values are rounded to one decimal place, half away from zero.

use std::fmt;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::LeakFlowError;

/// Decimal places kept on interpolated flow values.
pub const GPH_SCALE: u32 = 1;

/// One calibration point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureFlowEntry {
    #[serde(with = "rust_decimal::serde::float")]
    pub psi: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub gph: Decimal,
}

impl PressureFlowEntry {
    pub fn new(psi: Decimal, gph: Decimal) -> Self {
        Self { psi, gph }
    }
}

impl fmt::Display for PressureFlowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} PSI -> {} GPH", self.psi, self.gph)
    }
}

/// Which rule produced a [`LeakFlow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeakFlowMethod {
    Exact,
    Interpolated,
    OutOfRangeLow,
    OutOfRangeHigh,
}

impl LeakFlowMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeakFlowMethod::Exact => "EXACT",
            LeakFlowMethod::Interpolated => "INTERPOLATED",
            LeakFlowMethod::OutOfRangeLow => "OUT_OF_RANGE_LOW",
            LeakFlowMethod::OutOfRangeHigh => "OUT_OF_RANGE_HIGH",
        }
    }
}

impl fmt::Display for LeakFlowMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a leak-flow lookup.
///
/// `lower`/`upper` are the table entries the value came from: the matched
/// entry twice for an exact hit, the two neighbours for an interpolation,
/// and only the clamping end for out-of-range inputs. `explanation` is for
/// display and carries no authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakFlow {
    #[serde(with = "rust_decimal::serde::float")]
    pub psi: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub gph: Decimal,
    pub method: LeakFlowMethod,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<PressureFlowEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<PressureFlowEntry>,
}

/// An ordered, duplicate-free calibration table.
///
/// Construction rejects malformed input rather than normalising it, so a
/// table that exists is always strictly ascending by `psi`. Tables are never
/// edited in place; an administrative change builds a new table and swaps it
/// in whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PressureFlowEntry>", into = "Vec<PressureFlowEntry>")]
pub struct PressureTable {
    entries: Vec<PressureFlowEntry>,
}

impl PressureTable {
    /// Validate and build a table.
    ///
    /// Fails with `InvalidConfiguration` if `entries` is empty, if any `psi`
    /// is not strictly greater than its predecessor (unsorted or duplicate),
    /// or if any `gph` is negative.
    pub fn new(entries: Vec<PressureFlowEntry>) -> Result<Self, LeakFlowError> {
        if entries.is_empty() {
            return Err(LeakFlowError::InvalidConfiguration {
                reason: "table has no entries".to_string(),
            });
        }
        for (i, entry) in entries.iter().enumerate() {
            if entry.gph.is_sign_negative() && !entry.gph.is_zero() {
                return Err(LeakFlowError::InvalidConfiguration {
                    reason: format!("entry {i} has negative flow {} GPH", entry.gph.normalize()),
                });
            }
            if i == 0 {
                continue;
            }
            let prev = entries[i - 1].psi;
            if entry.psi == prev {
                return Err(LeakFlowError::InvalidConfiguration {
                    reason: format!("entry {i} duplicates {} PSI", entry.psi.normalize()),
                });
            }
            if entry.psi < prev {
                return Err(LeakFlowError::InvalidConfiguration {
                    reason: format!(
                        "entry {i} ({} PSI) is out of order after {} PSI",
                        entry.psi.normalize(),
                        prev.normalize()
                    ),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Build a table from `(psi, gph)` pairs given as `f64`.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self, LeakFlowError> {
        let entries = pairs
            .iter()
            .enumerate()
            .map(|(i, &(psi, gph))| {
                let convert = |v: f64| {
                    decimal_from_f64(v).map_err(|reason| LeakFlowError::InvalidConfiguration {
                        reason: format!("entry {i}: {reason}"),
                    })
                };
                Ok(PressureFlowEntry::new(convert(psi)?, convert(gph)?))
            })
            .collect::<Result<Vec<_>, LeakFlowError>>()?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[PressureFlowEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn min(&self) -> PressureFlowEntry {
        self.entries[0]
    }

    pub fn max(&self) -> PressureFlowEntry {
        self.entries[self.entries.len() - 1]
    }

    /// Look up the flow for a pressure reading given as `f64`.
    pub fn leak_flow(&self, psi: f64) -> Result<LeakFlow, LeakFlowError> {
        let psi = decimal_from_f64(psi).map_err(|reason| LeakFlowError::InvalidInput { reason })?;
        self.leak_flow_decimal(psi)
    }

    /// Like [`PressureTable::leak_flow`], treating an absent reading as invalid.
    pub fn leak_flow_opt(&self, psi: Option<f64>) -> Result<LeakFlow, LeakFlowError> {
        match psi {
            Some(psi) => self.leak_flow(psi),
            None => Err(LeakFlowError::InvalidInput {
                reason: "operating pressure is missing".to_string(),
            }),
        }
    }

    /// Look up the flow for an already-decimal pressure. Every input maps to
    /// exactly one rule; only an interpolation whose arithmetic leaves the
    /// `Decimal` range fails, with `InvalidInput`.
    pub fn leak_flow_decimal(&self, psi: Decimal) -> Result<LeakFlow, LeakFlowError> {
        let flow = match self.entries.binary_search_by(|e| e.psi.cmp(&psi)) {
            Ok(i) => {
                let hit = self.entries[i];
                LeakFlow {
                    psi,
                    gph: hit.gph,
                    method: LeakFlowMethod::Exact,
                    explanation: format!("table value: {} PSI -> {} GPH", hit.psi, hit.gph),
                    lower: Some(hit),
                    upper: Some(hit),
                }
            }
            Err(0) => {
                let min = self.min();
                LeakFlow {
                    psi,
                    gph: min.gph,
                    method: LeakFlowMethod::OutOfRangeLow,
                    explanation: format!(
                        "{} PSI is below the table minimum ({} PSI); using minimum value {} GPH",
                        psi.normalize(),
                        min.psi,
                        min.gph
                    ),
                    lower: None,
                    upper: Some(min),
                }
            }
            Err(i) if i == self.entries.len() => {
                let max = self.max();
                LeakFlow {
                    psi,
                    gph: max.gph,
                    method: LeakFlowMethod::OutOfRangeHigh,
                    explanation: format!(
                        "{} PSI is above the table maximum ({} PSI); using maximum value {} GPH",
                        psi.normalize(),
                        max.psi,
                        max.gph
                    ),
                    lower: Some(max),
                    upper: None,
                }
            }
            Err(i) => {
                let lo = self.entries[i - 1];
                let hi = self.entries[i];
                LeakFlow {
                    psi,
                    gph: interpolate(lo, hi, psi)?,
                    method: LeakFlowMethod::Interpolated,
                    explanation: format!(
                        "interpolated between {} PSI ({} GPH) and {} PSI ({} GPH)",
                        lo.psi, lo.gph, hi.psi, hi.gph
                    ),
                    lower: Some(lo),
                    upper: Some(hi),
                }
            }
        };
        Ok(flow)
    }
}

impl Default for PressureTable {
    /// The regulatory calibration table, 16 to 48 PSI.
    fn default() -> Self {
        const POINTS: [(i64, i64); 33] = [
            (16, 38),
            (17, 39),
            (18, 40),
            (19, 41),
            (20, 43),
            (21, 44),
            (22, 45),
            (23, 46),
            (24, 47),
            (25, 47),
            (26, 48),
            (27, 49),
            (28, 50),
            (29, 51),
            (30, 52),
            (31, 53),
            (32, 54),
            (33, 55),
            (34, 55),
            (35, 56),
            (36, 57),
            (37, 58),
            (38, 59),
            (39, 59),
            (40, 60),
            (41, 61),
            (42, 62),
            (43, 62),
            (44, 63),
            (45, 64),
            (46, 64),
            (47, 65),
            (48, 66),
        ];
        Self {
            entries: POINTS
                .iter()
                .map(|&(psi, tenths)| PressureFlowEntry::new(Decimal::from(psi), Decimal::new(tenths, 1)))
                .collect(),
        }
    }
}

impl TryFrom<Vec<PressureFlowEntry>> for PressureTable {
    type Error = LeakFlowError;

    fn try_from(entries: Vec<PressureFlowEntry>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl From<PressureTable> for Vec<PressureFlowEntry> {
    fn from(table: PressureTable) -> Self {
        table.entries
    }
}

/// Compute the leak-flow threshold for `psi` against `table`.
///
/// `None`, NaN and infinite inputs fail with `InvalidInput`, which callers
/// must keep distinct from a computed value of zero.
pub fn compute_leak_flow(psi: Option<f64>, table: &PressureTable) -> Result<LeakFlow, LeakFlowError> {
    table.leak_flow_opt(psi)
}

/// `lo.gph + (psi - lo.psi) * (hi.gph - lo.gph) / (hi.psi - lo.psi)`,
/// rounded half away from zero. Requires `lo.psi < psi < hi.psi`.
fn interpolate(
    lo: PressureFlowEntry,
    hi: PressureFlowEntry,
    psi: Decimal,
) -> Result<Decimal, LeakFlowError> {
    let overflow = || LeakFlowError::InvalidInput {
        reason: format!(
            "{} PSI cannot be interpolated between {} PSI and {} PSI without overflow",
            psi.normalize(),
            lo.psi,
            hi.psi
        ),
    };
    let offset = psi.checked_sub(lo.psi).ok_or_else(overflow)?;
    let psi_span = hi.psi.checked_sub(lo.psi).ok_or_else(overflow)?;
    let gph_span = hi.gph.checked_sub(lo.gph).ok_or_else(overflow)?;
    // Multiply before dividing so exact midpoints stay exact; wide tables
    // whose product overflows fall back to the ratio, which stays below 1.
    let delta = match offset.checked_mul(gph_span) {
        Some(product) => product.checked_div(psi_span),
        None => offset
            .checked_div(psi_span)
            .and_then(|ratio| ratio.checked_mul(gph_span)),
    }
    .ok_or_else(overflow)?;
    let gph = lo.gph.checked_add(delta).ok_or_else(overflow)?;
    Ok(gph.round_dp_with_strategy(GPH_SCALE, RoundingStrategy::MidpointAwayFromZero))
}

pub(crate) fn decimal_from_f64(value: f64) -> Result<Decimal, String> {
    if !value.is_finite() {
        return Err(format!("{value} is not a finite number"));
    }
    Decimal::from_f64(value).ok_or_else(|| format!("{value} is outside the representable range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(units: i64, scale: u32) -> Decimal {
        Decimal::new(units, scale)
    }

    fn two_point_table() -> PressureTable {
        PressureTable::new(vec![
            PressureFlowEntry::new(d(30, 0), d(52, 1)),
            PressureFlowEntry::new(d(31, 0), d(53, 1)),
        ])
        .unwrap()
    }

    #[test]
    fn midpoint_rounds_half_away_from_zero() {
        // 5.2 + 0.5 * 0.1 = 5.25, which banker's rounding would turn into 5.2.
        let flow = two_point_table().leak_flow(30.5).unwrap();
        assert_eq!(flow.gph, d(53, 1));
        assert_eq!(flow.method, LeakFlowMethod::Interpolated);
    }

    #[test]
    fn exact_match_returns_entry_unrounded() {
        let table = PressureTable::new(vec![
            PressureFlowEntry::new(d(10, 0), d(1234, 3)),
            PressureFlowEntry::new(d(20, 0), d(2, 0)),
        ])
        .unwrap();
        let flow = table.leak_flow(10.0).unwrap();
        assert_eq!(flow.gph, d(1234, 3));
        assert_eq!(flow.method, LeakFlowMethod::Exact);
    }

    #[test]
    fn below_minimum_clamps_low() {
        let flow = PressureTable::default().leak_flow(10.0).unwrap();
        assert_eq!(flow.gph, d(38, 1));
        assert_eq!(flow.method, LeakFlowMethod::OutOfRangeLow);
        assert_eq!(flow.lower, None);
        assert_eq!(flow.upper.map(|e| e.psi), Some(d(16, 0)));
    }

    #[test]
    fn above_maximum_clamps_high() {
        let flow = PressureTable::default().leak_flow(120.0).unwrap();
        assert_eq!(flow.gph, d(66, 1));
        assert_eq!(flow.method, LeakFlowMethod::OutOfRangeHigh);
        assert!(flow.explanation.contains("above the table maximum (48 PSI)"));
    }

    #[test]
    fn negative_pressure_is_out_of_range_not_invalid() {
        let flow = PressureTable::default().leak_flow(-5.0).unwrap();
        assert_eq!(flow.method, LeakFlowMethod::OutOfRangeLow);
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let table = PressureTable::default();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                table.leak_flow(bad),
                Err(LeakFlowError::InvalidInput { .. })
            ));
        }
        assert!(matches!(
            compute_leak_flow(None, &table),
            Err(LeakFlowError::InvalidInput { .. })
        ));
    }

    #[test]
    fn unrepresentable_input_is_rejected() {
        assert!(matches!(
            PressureTable::default().leak_flow(1e300),
            Err(LeakFlowError::InvalidInput { .. })
        ));
    }

    #[test]
    fn zero_pressure_is_a_valid_reading() {
        // The calculator never collapses "no reading" into 0 GPH, and a real
        // 0 PSI reading is simply below range.
        let flow = PressureTable::default().leak_flow(0.0).unwrap();
        assert_eq!(flow.method, LeakFlowMethod::OutOfRangeLow);
        assert_eq!(flow.gph, d(38, 1));
    }

    #[test]
    fn empty_table_is_rejected() {
        assert!(matches!(
            PressureTable::new(vec![]),
            Err(LeakFlowError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn duplicate_psi_is_rejected() {
        let err = PressureTable::from_pairs(&[(16.0, 3.8), (17.0, 3.9), (17.0, 4.0)]).unwrap_err();
        assert_eq!(
            err,
            LeakFlowError::InvalidConfiguration {
                reason: "entry 2 duplicates 17 PSI".to_string()
            }
        );
    }

    #[test]
    fn unsorted_table_is_rejected() {
        let err = PressureTable::from_pairs(&[(18.0, 4.0), (16.0, 3.8)]).unwrap_err();
        assert!(matches!(err, LeakFlowError::InvalidConfiguration { reason } if reason.contains("out of order")));
    }

    #[test]
    fn negative_flow_is_rejected() {
        assert!(PressureTable::from_pairs(&[(16.0, -0.1)]).is_err());
    }

    #[test]
    fn deserialization_goes_through_validation() {
        let ok: PressureTable =
            serde_json::from_str(r#"[{"psi":16,"gph":3.8},{"psi":17,"gph":3.9}]"#).unwrap();
        assert_eq!(ok.len(), 2);

        let bad = serde_json::from_str::<PressureTable>(r#"[{"psi":17,"gph":3.9},{"psi":16,"gph":3.8}]"#);
        assert!(bad.is_err());
    }

    #[test]
    fn single_entry_table_clamps_both_sides() {
        let table = PressureTable::from_pairs(&[(20.0, 4.3)]).unwrap();
        assert_eq!(table.leak_flow(19.0).unwrap().method, LeakFlowMethod::OutOfRangeLow);
        assert_eq!(table.leak_flow(20.0).unwrap().method, LeakFlowMethod::Exact);
        assert_eq!(table.leak_flow(21.0).unwrap().method, LeakFlowMethod::OutOfRangeHigh);
    }

    #[test]
    fn wide_table_interpolates_without_overflow() {
        let table = PressureTable::from_pairs(&[(0.0, 0.0), (1e15, 1e15)]).unwrap();
        let flow = compute_leak_flow(Some(5e14), &table).unwrap();
        assert_eq!(flow.method, LeakFlowMethod::Interpolated);
        assert_eq!(flow.gph, Decimal::from(500_000_000_000_000_i64));

        let extreme = PressureTable::new(vec![
            PressureFlowEntry::new(Decimal::ZERO, Decimal::ZERO),
            PressureFlowEntry::new(Decimal::MAX, Decimal::MAX),
        ])
        .unwrap();
        let flow = extreme.leak_flow_decimal(Decimal::MAX / Decimal::TWO).unwrap();
        assert_eq!(flow.method, LeakFlowMethod::Interpolated);
        assert!(flow.gph > Decimal::ZERO && flow.gph <= Decimal::MAX);
    }

    #[test]
    fn unrepresentable_span_is_invalid_input() {
        let table = PressureTable::new(vec![
            PressureFlowEntry::new(Decimal::MIN, Decimal::ZERO),
            PressureFlowEntry::new(Decimal::MAX, Decimal::ONE),
        ])
        .unwrap();
        assert!(matches!(
            table.leak_flow_decimal(Decimal::ZERO),
            Err(LeakFlowError::InvalidInput { reason }) if reason.contains("overflow")
        ));
    }

    #[test]
    fn explanation_names_bounding_entries() {
        let flow = PressureTable::default().leak_flow(30.5).unwrap();
        assert_eq!(
            flow.explanation,
            "interpolated between 30 PSI (5.2 GPH) and 31 PSI (5.3 GPH)"
        );
    }
}
