//! Financial ratios and the qualitative health overlay.
//!
//! Any ratio with a zero denominator is exactly `0.0`. That is a display-safe
//! default for "undefined", not a statement that the ratio is healthy.

use crate::schema::{
    section_total, AccountCategory, ClassifiedAccount, GeneratedStatements,
};
use crate::utils::{is_total_row, round_to};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const RATIO_DECIMALS: u32 = 4;

/// Grouped totals the ratios are computed from. All amounts are in their
/// natural sign: assets and expenses debit-positive, liabilities, equity and
/// revenue credit-positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RatioInputs {
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub total_equity: f64,
    pub total_revenue: f64,
    pub total_expenses: f64,
    pub current_assets: f64,
    pub current_liabilities: f64,
    pub inventory: f64,
    pub receivables: f64,
    pub payables: f64,
}

impl RatioInputs {
    /// Groups classified accounts by code prefix.
    ///
    /// Codes 1–2 are current assets, 1 inventory, 4 receivables; every
    /// liability (6) counts as current and as a payable. Subtotal rows are
    /// skipped so they are not double counted.
    pub fn from_accounts(accounts: &[ClassifiedAccount]) -> Self {
        let mut inputs = Self::default();

        for account in accounts {
            if is_total_row(account.name()) {
                continue;
            }
            let balance = account.balance();

            match account.category {
                AccountCategory::Asset => {
                    inputs.total_assets += balance;
                    match account.prefix() {
                        Some('1') => {
                            inputs.current_assets += balance;
                            inputs.inventory += balance;
                        }
                        Some('2') => inputs.current_assets += balance,
                        Some('4') => inputs.receivables += balance,
                        _ => {}
                    }
                }
                AccountCategory::Liability => {
                    inputs.total_liabilities -= balance;
                    inputs.current_liabilities -= balance;
                    inputs.payables -= balance;
                }
                AccountCategory::Equity => inputs.total_equity -= balance,
                AccountCategory::Revenue => inputs.total_revenue -= balance,
                AccountCategory::Expense => inputs.total_expenses += balance,
                AccountCategory::Unclassified => {}
            }
        }

        inputs
    }

    /// Derives inputs from generated statements alone.
    ///
    /// Statements carry no account codes, so current assets are the asset lines
    /// that also feed operating cash flow, all liabilities are treated as
    /// current payables, and inventory / receivables are unknown (zero).
    pub fn from_statements(statements: &GeneratedStatements) -> Self {
        let bs = &statements.balance_sheet;
        let current_assets: f64 = bs
            .assets
            .iter()
            .filter(|(name, _)| statements.cash_flow.operating.contains_key(*name))
            .map(|(_, v)| v)
            .sum();
        let liabilities = section_total(&bs.liabilities);

        Self {
            total_assets: section_total(&bs.assets),
            total_liabilities: liabilities,
            total_equity: section_total(&bs.equity),
            total_revenue: statements.total_revenue(),
            total_expenses: statements.total_expenses(),
            current_assets,
            current_liabilities: liabilities,
            inventory: 0.0,
            receivables: 0.0,
            payables: liabilities,
        }
    }

    pub fn net_income(&self) -> f64 {
        self.total_revenue - self.total_expenses
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Profitability {
    pub gross_profit_margin: f64,
    pub operating_margin: f64,
    pub net_profit_margin: f64,
    pub return_on_assets: f64,
    pub return_on_equity: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Liquidity {
    pub current_ratio: f64,
    pub quick_ratio: f64,
    pub working_capital: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Efficiency {
    pub asset_turnover: f64,
    pub inventory_turnover: f64,
    pub receivables_turnover: f64,
    pub payables_turnover: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Leverage {
    pub debt_to_equity: f64,
    pub debt_to_assets: f64,
    pub equity_multiplier: f64,
}

/// Read-only ratio snapshot for one set of statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialRatios {
    pub profitability: Profitability,
    pub liquidity: Liquidity,
    pub efficiency: Efficiency,
    pub leverage: Leverage,
}

/// `numerator / denominator` rounded to four places, `0.0` when undefined.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return 0.0;
    }
    let quotient = numerator / denominator;
    if !quotient.is_finite() {
        return 0.0;
    }
    // Scaling for rounding can overflow near f64::MAX; such values carry no fraction.
    let rounded = round_to(quotient, RATIO_DECIMALS);
    if rounded.is_finite() {
        rounded
    } else {
        quotient
    }
}

impl FinancialRatios {
    pub fn calculate(inputs: &RatioInputs) -> Self {
        let net_income = inputs.net_income();

        Self {
            profitability: Profitability {
                gross_profit_margin: safe_ratio(
                    inputs.total_revenue - inputs.total_expenses,
                    inputs.total_revenue,
                ),
                operating_margin: safe_ratio(net_income, inputs.total_revenue),
                net_profit_margin: safe_ratio(net_income, inputs.total_revenue),
                return_on_assets: safe_ratio(net_income, inputs.total_assets),
                return_on_equity: safe_ratio(net_income, inputs.total_equity),
            },
            liquidity: Liquidity {
                current_ratio: safe_ratio(inputs.current_assets, inputs.current_liabilities),
                quick_ratio: safe_ratio(
                    inputs.current_assets - inputs.inventory,
                    inputs.current_liabilities,
                ),
                working_capital: round_to(
                    inputs.current_assets - inputs.current_liabilities,
                    RATIO_DECIMALS,
                ),
            },
            efficiency: Efficiency {
                asset_turnover: safe_ratio(inputs.total_revenue, inputs.total_assets),
                inventory_turnover: safe_ratio(inputs.total_revenue, inputs.inventory),
                receivables_turnover: safe_ratio(inputs.total_revenue, inputs.receivables),
                payables_turnover: safe_ratio(inputs.total_revenue, inputs.payables),
            },
            leverage: Leverage {
                debt_to_equity: safe_ratio(inputs.total_liabilities, inputs.total_equity),
                debt_to_assets: safe_ratio(inputs.total_liabilities, inputs.total_assets),
                equity_multiplier: safe_ratio(inputs.total_assets, inputs.total_equity),
            },
        }
    }

    pub fn from_accounts(accounts: &[ClassifiedAccount]) -> Self {
        Self::calculate(&RatioInputs::from_accounts(accounts))
    }

    pub fn from_statements(statements: &GeneratedStatements) -> Self {
        Self::calculate(&RatioInputs::from_statements(statements))
    }
}

pub const NET_PROFIT_MARGIN_STRONG: f64 = 0.15;
pub const NET_PROFIT_MARGIN_WEAK: f64 = 0.05;
pub const CURRENT_RATIO_STRONG: f64 = 2.0;
pub const CURRENT_RATIO_WEAK: f64 = 1.0;
pub const ASSET_TURNOVER_GOOD: f64 = 1.0;
pub const DEBT_TO_EQUITY_HIGH: f64 = 2.0;
pub const DEBT_TO_EQUITY_LOW: f64 = 0.5;

/// Thresholds for the qualitative overlay. Comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HealthThresholds {
    pub net_profit_margin_strong: f64,
    pub net_profit_margin_weak: f64,
    pub current_ratio_strong: f64,
    pub current_ratio_weak: f64,
    pub asset_turnover_good: f64,
    pub debt_to_equity_high: f64,
    pub debt_to_equity_low: f64,
}

pub const DEFAULT_THRESHOLDS: HealthThresholds = HealthThresholds {
    net_profit_margin_strong: NET_PROFIT_MARGIN_STRONG,
    net_profit_margin_weak: NET_PROFIT_MARGIN_WEAK,
    current_ratio_strong: CURRENT_RATIO_STRONG,
    current_ratio_weak: CURRENT_RATIO_WEAK,
    asset_turnover_good: ASSET_TURNOVER_GOOD,
    debt_to_equity_high: DEBT_TO_EQUITY_HIGH,
    debt_to_equity_low: DEBT_TO_EQUITY_LOW,
};

impl Default for HealthThresholds {
    fn default() -> Self {
        DEFAULT_THRESHOLDS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum BucketLabel {
    Good,
    NeedsImprovement,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BucketLabels {
    pub profitability: BucketLabel,
    pub liquidity: BucketLabel,
    pub efficiency: BucketLabel,
    pub leverage: BucketLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealthAssessment {
    pub labels: BucketLabels,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
}

pub fn assess_health(ratios: &FinancialRatios, thresholds: &HealthThresholds) -> HealthAssessment {
    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    let mut recommendations = Vec::new();

    let margin = ratios.profitability.net_profit_margin;
    let profitability = if margin > thresholds.net_profit_margin_strong {
        strengths.push("Strong net profit margin indicating good profitability".to_string());
        BucketLabel::Good
    } else if margin < thresholds.net_profit_margin_weak {
        weaknesses
            .push("Low net profit margin indicating potential profitability issues".to_string());
        recommendations
            .push("Consider cost reduction strategies and pricing optimization".to_string());
        BucketLabel::NeedsImprovement
    } else {
        BucketLabel::Neutral
    };

    let current = ratios.liquidity.current_ratio;
    let liquidity = if current > thresholds.current_ratio_strong {
        strengths.push("Strong liquidity position with healthy current ratio".to_string());
        BucketLabel::Good
    } else if current < thresholds.current_ratio_weak {
        weaknesses.push("Poor liquidity position with current ratio below 1".to_string());
        recommendations.push(
            "Improve working capital management and consider short-term financing options"
                .to_string(),
        );
        BucketLabel::NeedsImprovement
    } else {
        BucketLabel::Neutral
    };

    let efficiency = if ratios.efficiency.asset_turnover > thresholds.asset_turnover_good {
        strengths.push("Efficient asset utilization".to_string());
        BucketLabel::Good
    } else {
        weaknesses.push("Low asset turnover indicating potential inefficiencies".to_string());
        recommendations.push(
            "Review asset management practices and identify underutilized assets".to_string(),
        );
        BucketLabel::NeedsImprovement
    };

    let dte = ratios.leverage.debt_to_equity;
    let leverage = if dte > thresholds.debt_to_equity_high {
        weaknesses.push("High leverage indicating increased financial risk".to_string());
        recommendations
            .push("Consider debt reduction strategies or equity financing options".to_string());
        BucketLabel::NeedsImprovement
    } else if dte < thresholds.debt_to_equity_low {
        strengths.push("Conservative leverage position indicating financial stability".to_string());
        BucketLabel::Good
    } else {
        BucketLabel::Neutral
    };

    HealthAssessment {
        labels: BucketLabels {
            profitability,
            liquidity,
            efficiency,
            leverage,
        },
        strengths,
        weaknesses,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart_of_accounts::classify_rows;
    use crate::diagnostics::CapturingSink;
    use crate::schema::LedgerRow;

    fn accounts(rows: &[LedgerRow]) -> Vec<ClassifiedAccount> {
        classify_rows(rows, &CapturingSink::new())
    }

    #[test]
    fn test_zero_denominators_yield_zero() {
        let ratios = FinancialRatios::calculate(&RatioInputs::default());
        let json = serde_json::to_value(ratios).unwrap();
        for bucket in ["profitability", "liquidity", "efficiency", "leverage"] {
            for (name, value) in json[bucket].as_object().unwrap() {
                let v = value.as_f64().unwrap();
                assert!(v.is_finite(), "{} is not finite", name);
                assert_eq!(v, 0.0, "{} should be 0", name);
            }
        }
    }

    #[test]
    fn test_safe_ratio_rounds_to_four_places() {
        assert_eq!(safe_ratio(1.0, 3.0), 0.3333);
        assert_eq!(safe_ratio(2.0, 3.0), 0.6667);
        assert_eq!(safe_ratio(5.0, 0.0), 0.0);
        assert_eq!(safe_ratio(-5.0, 0.0), 0.0);
    }

    #[test]
    fn test_safe_ratio_overflow_yields_zero() {
        assert_eq!(safe_ratio(1e308, 1e-10), 0.0);
        assert_eq!(safe_ratio(-1e308, 1e-10), 0.0);
        let large = safe_ratio(1e306, 1.0);
        assert!(large.is_finite());
        assert_eq!(large, 1e306);
    }

    #[test]
    fn test_inputs_grouped_by_prefix() {
        let inputs = RatioInputs::from_accounts(&accounts(&[
            LedgerRow::new("1000", "Inventory", 400.0, 0.0),
            LedgerRow::new("2000", "Cash", 600.0, 0.0),
            LedgerRow::new("4000", "Receivables", 200.0, 0.0),
            LedgerRow::new("6000", "Payables", 0.0, 500.0),
            LedgerRow::new("5000", "Capital", 0.0, 700.0),
            LedgerRow::new("7000", "Sales", 0.0, 2400.0),
            LedgerRow::new("8000", "Costs", 2000.0, 0.0),
            LedgerRow::new("1999", "Total current assets", 1000.0, 0.0),
        ]));

        assert_eq!(inputs.total_assets, 1200.0);
        assert_eq!(inputs.current_assets, 1000.0);
        assert_eq!(inputs.inventory, 400.0);
        assert_eq!(inputs.receivables, 200.0);
        assert_eq!(inputs.current_liabilities, 500.0);
        assert_eq!(inputs.payables, 500.0);
        assert_eq!(inputs.total_equity, 700.0);
        assert_eq!(inputs.total_revenue, 2400.0);
        assert_eq!(inputs.total_expenses, 2000.0);

        let ratios = FinancialRatios::calculate(&inputs);
        assert_eq!(ratios.liquidity.current_ratio, 2.0);
        assert_eq!(ratios.liquidity.quick_ratio, 1.2);
        assert_eq!(ratios.liquidity.working_capital, 500.0);
        assert_eq!(ratios.profitability.net_profit_margin, 0.1667);
        assert_eq!(ratios.efficiency.asset_turnover, 2.0);
        assert_eq!(ratios.efficiency.inventory_turnover, 6.0);
        assert_eq!(ratios.efficiency.receivables_turnover, 12.0);
        assert_eq!(ratios.leverage.debt_to_equity, 0.7143);
        assert_eq!(ratios.leverage.debt_to_assets, 0.4167);
    }

    #[test]
    fn test_inputs_from_statements() {
        let mut statements = GeneratedStatements::default();
        statements.balance_sheet.assets.insert("Cash".into(), 100.0);
        statements.balance_sheet.assets.insert("Plant".into(), 300.0);
        statements.cash_flow.operating.insert("Cash".into(), 100.0);
        statements.balance_sheet.liabilities.insert("Loan".into(), 50.0);

        let inputs = RatioInputs::from_statements(&statements);
        assert_eq!(inputs.total_assets, 400.0);
        assert_eq!(inputs.current_assets, 100.0);
        assert_eq!(inputs.current_liabilities, 50.0);
        assert_eq!(inputs.inventory, 0.0);

        let ratios = FinancialRatios::calculate(&inputs);
        assert_eq!(ratios.efficiency.inventory_turnover, 0.0);
        assert_eq!(ratios.liquidity.current_ratio, 2.0);
    }

    #[test]
    fn test_threshold_table_matches_constants() {
        let t = HealthThresholds::default();
        assert_eq!(t.net_profit_margin_strong, 0.15);
        assert_eq!(t.net_profit_margin_weak, 0.05);
        assert_eq!(t.current_ratio_strong, 2.0);
        assert_eq!(t.current_ratio_weak, 1.0);
        assert_eq!(t.asset_turnover_good, 1.0);
        assert_eq!(t.debt_to_equity_high, 2.0);
        assert_eq!(t.debt_to_equity_low, 0.5);
    }

    #[test]
    fn test_health_overlay_labels() {
        let mut ratios = FinancialRatios::default();
        ratios.profitability.net_profit_margin = DEFAULT_THRESHOLDS.net_profit_margin_strong + 0.01;
        ratios.liquidity.current_ratio = DEFAULT_THRESHOLDS.current_ratio_weak - 0.1;
        ratios.efficiency.asset_turnover = 1.5;
        ratios.leverage.debt_to_equity = 1.0;

        let assessment = assess_health(&ratios, &DEFAULT_THRESHOLDS);
        assert_eq!(assessment.labels.profitability, BucketLabel::Good);
        assert_eq!(assessment.labels.liquidity, BucketLabel::NeedsImprovement);
        assert_eq!(assessment.labels.efficiency, BucketLabel::Good);
        assert_eq!(assessment.labels.leverage, BucketLabel::Neutral);
        assert_eq!(assessment.strengths.len(), 2);
        assert_eq!(assessment.weaknesses.len(), 1);
        assert_eq!(assessment.recommendations.len(), 1);
    }

    #[test]
    fn test_boundaries_are_strict() {
        let mut ratios = FinancialRatios::default();
        ratios.profitability.net_profit_margin = 0.15;
        ratios.liquidity.current_ratio = 2.0;
        ratios.efficiency.asset_turnover = 1.0;
        ratios.leverage.debt_to_equity = 2.0;

        let assessment = assess_health(&ratios, &HealthThresholds::default());
        assert_eq!(assessment.labels.profitability, BucketLabel::Neutral);
        assert_eq!(assessment.labels.liquidity, BucketLabel::Neutral);
        assert_eq!(assessment.labels.efficiency, BucketLabel::NeedsImprovement);
        assert_eq!(assessment.labels.leverage, BucketLabel::Neutral);
    }
}
