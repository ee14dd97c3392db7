//! Category code → reporting box mapping.
//!
//! Category codes are a closed set produced by the categorisation
//! subsystem. Each reporting code lands on exactly one box; `personal` and
//! `transfer` never reach the totals. Anything else is uncategorised and
//! surfaces as a data-quality warning instead of disappearing.

use std::str::FromStr;

use super::{BoxRef, BusinessFamily, ExpenseBox, IncomeBox};
use crate::error::MtdError;
use crate::models::BusinessType;

/// Closed set of category codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryCode {
    SeSales,
    SeOtherIncome,
    SeCostOfGoods,
    SeSubcontractors,
    SeWages,
    SeCarVanTravel,
    SeRepairs,
    SeAdmin,
    SeEntertainment,
    SeAdvertising,
    SeLoanInterest,
    SeFinanceCharges,
    SeBadDebts,
    SeDepreciation,
    SeOtherExpenses,
    SePremises,
    SeProfessionalFees,

    PropertyRent,
    PropertyOtherIncome,
    PropertyPremisesRunning,
    PropertyProfessionalFees,
    PropertyRepairs,
    PropertyFinanceCosts,
    PropertyServices,
    PropertyResidentialFinance,
    PropertyTravel,
    PropertyOtherExpenses,

    Personal,
    Transfer,
}

impl CategoryCode {
    pub const ALL: [CategoryCode; 29] = [
        CategoryCode::SeSales,
        CategoryCode::SeOtherIncome,
        CategoryCode::SeCostOfGoods,
        CategoryCode::SeSubcontractors,
        CategoryCode::SeWages,
        CategoryCode::SeCarVanTravel,
        CategoryCode::SeRepairs,
        CategoryCode::SeAdmin,
        CategoryCode::SeEntertainment,
        CategoryCode::SeAdvertising,
        CategoryCode::SeLoanInterest,
        CategoryCode::SeFinanceCharges,
        CategoryCode::SeBadDebts,
        CategoryCode::SeDepreciation,
        CategoryCode::SeOtherExpenses,
        CategoryCode::SePremises,
        CategoryCode::SeProfessionalFees,
        CategoryCode::PropertyRent,
        CategoryCode::PropertyOtherIncome,
        CategoryCode::PropertyPremisesRunning,
        CategoryCode::PropertyProfessionalFees,
        CategoryCode::PropertyRepairs,
        CategoryCode::PropertyFinanceCosts,
        CategoryCode::PropertyServices,
        CategoryCode::PropertyResidentialFinance,
        CategoryCode::PropertyTravel,
        CategoryCode::PropertyOtherExpenses,
        CategoryCode::Personal,
        CategoryCode::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryCode::SeSales => "se_sales",
            CategoryCode::SeOtherIncome => "se_other_income",
            CategoryCode::SeCostOfGoods => "se_cost_of_goods",
            CategoryCode::SeSubcontractors => "se_subcontractors",
            CategoryCode::SeWages => "se_wages",
            CategoryCode::SeCarVanTravel => "se_car_van_travel",
            CategoryCode::SeRepairs => "se_repairs",
            CategoryCode::SeAdmin => "se_admin",
            CategoryCode::SeEntertainment => "se_entertainment",
            CategoryCode::SeAdvertising => "se_advertising",
            CategoryCode::SeLoanInterest => "se_loan_interest",
            CategoryCode::SeFinanceCharges => "se_finance_charges",
            CategoryCode::SeBadDebts => "se_bad_debts",
            CategoryCode::SeDepreciation => "se_depreciation",
            CategoryCode::SeOtherExpenses => "se_other_expenses",
            CategoryCode::SePremises => "se_premises",
            CategoryCode::SeProfessionalFees => "se_professional_fees",
            CategoryCode::PropertyRent => "property_rent",
            CategoryCode::PropertyOtherIncome => "property_other_income",
            CategoryCode::PropertyPremisesRunning => "property_premises_running",
            CategoryCode::PropertyProfessionalFees => "property_professional_fees",
            CategoryCode::PropertyRepairs => "property_repairs",
            CategoryCode::PropertyFinanceCosts => "property_finance_costs",
            CategoryCode::PropertyServices => "property_services",
            CategoryCode::PropertyResidentialFinance => "property_residential_finance",
            CategoryCode::PropertyTravel => "property_travel",
            CategoryCode::PropertyOtherExpenses => "property_other_expenses",
            CategoryCode::Personal => "personal",
            CategoryCode::Transfer => "transfer",
        }
    }

    /// Business family the code reports under; `None` for non-reporting codes.
    pub fn family(&self) -> Option<BusinessFamily> {
        use CategoryCode::*;
        match self {
            SeSales | SeOtherIncome | SeCostOfGoods | SeSubcontractors | SeWages
            | SeCarVanTravel | SeRepairs | SeAdmin | SeEntertainment | SeAdvertising
            | SeLoanInterest | SeFinanceCharges | SeBadDebts | SeDepreciation
            | SeOtherExpenses | SePremises | SeProfessionalFees => {
                Some(BusinessFamily::SelfEmployment)
            }
            PropertyRent | PropertyOtherIncome | PropertyPremisesRunning
            | PropertyProfessionalFees | PropertyRepairs | PropertyFinanceCosts
            | PropertyServices | PropertyResidentialFinance | PropertyTravel
            | PropertyOtherExpenses => Some(BusinessFamily::Property),
            Personal | Transfer => None,
        }
    }

    pub fn reporting_box(&self) -> Option<BoxRef> {
        use BoxRef::{Expense, Income};
        use CategoryCode::*;
        let b = match self {
            SeSales | PropertyRent => Income(IncomeBox::Turnover),
            SeOtherIncome | PropertyOtherIncome => Income(IncomeBox::Other),
            SeCostOfGoods => Expense(ExpenseBox::CostOfGoods),
            SeSubcontractors => Expense(ExpenseBox::PaymentsToSubcontractors),
            SeWages => Expense(ExpenseBox::WagesAndStaffCosts),
            SeCarVanTravel => Expense(ExpenseBox::CarVanTravelExpenses),
            SeRepairs => Expense(ExpenseBox::MaintenanceCosts),
            SeAdmin => Expense(ExpenseBox::AdminCosts),
            SeEntertainment => Expense(ExpenseBox::BusinessEntertainmentCosts),
            SeAdvertising => Expense(ExpenseBox::AdvertisingCosts),
            SeLoanInterest => Expense(ExpenseBox::InterestOnBankOtherLoans),
            SeFinanceCharges => Expense(ExpenseBox::FinanceCharges),
            SeBadDebts => Expense(ExpenseBox::IrrecoverableDebts),
            SeDepreciation => Expense(ExpenseBox::Depreciation),
            SeOtherExpenses => Expense(ExpenseBox::OtherExpenses),
            SePremises | PropertyPremisesRunning => Expense(ExpenseBox::PremisesRunningCosts),
            SeProfessionalFees | PropertyProfessionalFees => {
                Expense(ExpenseBox::ProfessionalFees)
            }
            PropertyRepairs => Expense(ExpenseBox::RepairsAndMaintenance),
            PropertyFinanceCosts => Expense(ExpenseBox::FinancialCosts),
            PropertyServices => Expense(ExpenseBox::CostOfServices),
            PropertyResidentialFinance => Expense(ExpenseBox::ResidentialFinancialCost),
            PropertyTravel => Expense(ExpenseBox::TravelCosts),
            PropertyOtherExpenses => Expense(ExpenseBox::Other),
            Personal | Transfer => return None,
        };
        Some(b)
    }
}

impl FromStr for CategoryCode {
    type Err = MtdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| MtdError::Validation(format!("Unknown category code '{s}'")))
    }
}

/// Map a raw category code to its reporting box.
///
/// `None` for unknown codes and for the non-reporting codes.
pub fn map_to_box(category_code: &str) -> Option<BoxRef> {
    category_code
        .parse::<CategoryCode>()
        .ok()
        .and_then(|c| c.reporting_box())
}

/// How a transaction's category affects aggregation for one business type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Reportable(BoxRef),
    /// Personal spending or an internal transfer: tracked, never totalled.
    Excluded,
    /// Missing, unknown, or belonging to another business family.
    Uncategorised,
}

pub fn classify(category_code: Option<&str>, business_type: BusinessType) -> Classification {
    let Some(code) = category_code.and_then(|c| c.parse::<CategoryCode>().ok()) else {
        return Classification::Uncategorised;
    };
    match (code.family(), code.reporting_box()) {
        (None, _) => Classification::Excluded,
        (Some(family), Some(b)) if family == business_type.family() => {
            Classification::Reportable(b)
        }
        _ => Classification::Uncategorised,
    }
}

/// Check the mapping table against the full box schema.
///
/// Every box accepted by every business type must be reachable from some
/// category of that family, and every reporting category must land on a
/// box its family accepts. Run at startup.
pub fn validate_mapping() -> Result<(), MtdError> {
    let mut problems = Vec::new();

    for business_type in BusinessType::ALL {
        let family = business_type.family();
        let reachable: Vec<BoxRef> = CategoryCode::ALL
            .iter()
            .filter(|c| c.family() == Some(family))
            .filter_map(|c| c.reporting_box())
            .collect();

        let schema = IncomeBox::ALL.into_iter().map(BoxRef::Income).chain(
            ExpenseBox::for_business_type(business_type).map(BoxRef::Expense),
        );
        for b in schema {
            if !reachable.contains(&b) {
                problems.push(format!("{business_type}: no category maps to {b}"));
            }
        }
    }

    for code in CategoryCode::ALL {
        if let (Some(family), Some(BoxRef::Expense(b))) = (code.family(), code.reporting_box())
            && !b.families().contains(&family)
        {
            problems.push(format!(
                "category {} maps to {} outside its family",
                code.as_str(),
                b.key()
            ));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(MtdError::Internal(format!(
            "category mapping incomplete: {}",
            problems.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_covers_every_box() {
        validate_mapping().unwrap();
    }

    #[test]
    fn codes_round_trip() {
        for code in CategoryCode::ALL {
            assert_eq!(code.as_str().parse::<CategoryCode>().unwrap(), code);
        }
    }

    #[test]
    fn map_to_box_examples() {
        assert_eq!(
            map_to_box("property_travel"),
            Some(BoxRef::Expense(ExpenseBox::TravelCosts))
        );
        assert_eq!(map_to_box("se_sales"), Some(BoxRef::Income(IncomeBox::Turnover)));
        assert_eq!(map_to_box("personal"), None);
        assert_eq!(map_to_box("groceries"), None);
    }

    #[test]
    fn classify_separates_excluded_from_uncategorised() {
        let se = BusinessType::SelfEmployment;
        assert_eq!(classify(Some("transfer"), se), Classification::Excluded);
        assert_eq!(classify(None, se), Classification::Uncategorised);
        assert_eq!(classify(Some("mystery"), se), Classification::Uncategorised);
        // A property code cannot be reported on a self-employment summary.
        assert_eq!(classify(Some("property_rent"), se), Classification::Uncategorised);
        assert_eq!(
            classify(Some("property_rent"), BusinessType::ForeignProperty),
            Classification::Reportable(BoxRef::Income(IncomeBox::Turnover))
        );
    }
}
