//! Standardised reporting boxes.
//!
//! The income and expense boxes HMRC accepts in period and cumulative
//! summaries. `ExpenseBox` is the union of the self-employment and property
//! itemised schemas; each box knows which business types accept it and how
//! it is spelled on the wire.

pub mod mapping;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MtdError;
use crate::models::BusinessType;

pub use mapping::{CategoryCode, Classification, classify, map_to_box, validate_mapping};

/// Business families that share one expense schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BusinessFamily {
    SelfEmployment,
    Property,
}

/// Income boxes. Every business type reports turnover and other income.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IncomeBox {
    Turnover,
    Other,
}

impl IncomeBox {
    pub const ALL: [IncomeBox; 2] = [IncomeBox::Turnover, IncomeBox::Other];

    pub fn key(&self) -> &'static str {
        match self {
            IncomeBox::Turnover => "turnover",
            IncomeBox::Other => "other",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.key() == key)
    }
}

/// Itemised expense boxes.
///
/// `ALL` must list every variant in declaration order; the compile-time
/// check below fails the build when it drifts from `ordinal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExpenseBox {
    // Self-employment only
    CostOfGoods,
    PaymentsToSubcontractors,
    WagesAndStaffCosts,
    CarVanTravelExpenses,
    MaintenanceCosts,
    AdminCosts,
    BusinessEntertainmentCosts,
    AdvertisingCosts,
    InterestOnBankOtherLoans,
    FinanceCharges,
    IrrecoverableDebts,
    Depreciation,
    OtherExpenses,
    // Shared
    PremisesRunningCosts,
    ProfessionalFees,
    // Property only
    RepairsAndMaintenance,
    FinancialCosts,
    CostOfServices,
    ResidentialFinancialCost,
    TravelCosts,
    Other,
}

impl ExpenseBox {
    pub const ALL: [ExpenseBox; 21] = [
        ExpenseBox::CostOfGoods,
        ExpenseBox::PaymentsToSubcontractors,
        ExpenseBox::WagesAndStaffCosts,
        ExpenseBox::CarVanTravelExpenses,
        ExpenseBox::MaintenanceCosts,
        ExpenseBox::AdminCosts,
        ExpenseBox::BusinessEntertainmentCosts,
        ExpenseBox::AdvertisingCosts,
        ExpenseBox::InterestOnBankOtherLoans,
        ExpenseBox::FinanceCharges,
        ExpenseBox::IrrecoverableDebts,
        ExpenseBox::Depreciation,
        ExpenseBox::OtherExpenses,
        ExpenseBox::PremisesRunningCosts,
        ExpenseBox::ProfessionalFees,
        ExpenseBox::RepairsAndMaintenance,
        ExpenseBox::FinancialCosts,
        ExpenseBox::CostOfServices,
        ExpenseBox::ResidentialFinancialCost,
        ExpenseBox::TravelCosts,
        ExpenseBox::Other,
    ];

    const fn ordinal(self) -> usize {
        match self {
            ExpenseBox::CostOfGoods => 0,
            ExpenseBox::PaymentsToSubcontractors => 1,
            ExpenseBox::WagesAndStaffCosts => 2,
            ExpenseBox::CarVanTravelExpenses => 3,
            ExpenseBox::MaintenanceCosts => 4,
            ExpenseBox::AdminCosts => 5,
            ExpenseBox::BusinessEntertainmentCosts => 6,
            ExpenseBox::AdvertisingCosts => 7,
            ExpenseBox::InterestOnBankOtherLoans => 8,
            ExpenseBox::FinanceCharges => 9,
            ExpenseBox::IrrecoverableDebts => 10,
            ExpenseBox::Depreciation => 11,
            ExpenseBox::OtherExpenses => 12,
            ExpenseBox::PremisesRunningCosts => 13,
            ExpenseBox::ProfessionalFees => 14,
            ExpenseBox::RepairsAndMaintenance => 15,
            ExpenseBox::FinancialCosts => 16,
            ExpenseBox::CostOfServices => 17,
            ExpenseBox::ResidentialFinancialCost => 18,
            ExpenseBox::TravelCosts => 19,
            ExpenseBox::Other => 20,
        }
    }

    /// Wire key in HMRC's itemised expense object.
    pub fn key(&self) -> &'static str {
        match self {
            ExpenseBox::CostOfGoods => "costOfGoods",
            ExpenseBox::PaymentsToSubcontractors => "paymentsToSubcontractors",
            ExpenseBox::WagesAndStaffCosts => "wagesAndStaffCosts",
            ExpenseBox::CarVanTravelExpenses => "carVanTravelExpenses",
            ExpenseBox::MaintenanceCosts => "maintenanceCosts",
            ExpenseBox::AdminCosts => "adminCosts",
            ExpenseBox::BusinessEntertainmentCosts => "businessEntertainmentCosts",
            ExpenseBox::AdvertisingCosts => "advertisingCosts",
            ExpenseBox::InterestOnBankOtherLoans => "interestOnBankOtherLoans",
            ExpenseBox::FinanceCharges => "financeCharges",
            ExpenseBox::IrrecoverableDebts => "irrecoverableDebts",
            ExpenseBox::Depreciation => "depreciation",
            ExpenseBox::OtherExpenses => "otherExpenses",
            ExpenseBox::PremisesRunningCosts => "premisesRunningCosts",
            ExpenseBox::ProfessionalFees => "professionalFees",
            ExpenseBox::RepairsAndMaintenance => "repairsAndMaintenance",
            ExpenseBox::FinancialCosts => "financialCosts",
            ExpenseBox::CostOfServices => "costOfServices",
            ExpenseBox::ResidentialFinancialCost => "residentialFinancialCost",
            ExpenseBox::TravelCosts => "travelCosts",
            ExpenseBox::Other => "other",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.key() == key)
    }

    pub fn families(&self) -> &'static [BusinessFamily] {
        use BusinessFamily::*;
        match self {
            ExpenseBox::CostOfGoods
            | ExpenseBox::PaymentsToSubcontractors
            | ExpenseBox::WagesAndStaffCosts
            | ExpenseBox::CarVanTravelExpenses
            | ExpenseBox::MaintenanceCosts
            | ExpenseBox::AdminCosts
            | ExpenseBox::BusinessEntertainmentCosts
            | ExpenseBox::AdvertisingCosts
            | ExpenseBox::InterestOnBankOtherLoans
            | ExpenseBox::FinanceCharges
            | ExpenseBox::IrrecoverableDebts
            | ExpenseBox::Depreciation
            | ExpenseBox::OtherExpenses => &[SelfEmployment],
            ExpenseBox::PremisesRunningCosts | ExpenseBox::ProfessionalFees => {
                &[SelfEmployment, Property]
            }
            ExpenseBox::RepairsAndMaintenance
            | ExpenseBox::FinancialCosts
            | ExpenseBox::CostOfServices
            | ExpenseBox::ResidentialFinancialCost
            | ExpenseBox::TravelCosts
            | ExpenseBox::Other => &[Property],
        }
    }

    pub fn applies_to(&self, business_type: BusinessType) -> bool {
        self.families().contains(&business_type.family())
    }

    /// Boxes accepted for a business type, in schema order.
    pub fn for_business_type(business_type: BusinessType) -> impl Iterator<Item = ExpenseBox> {
        Self::ALL
            .into_iter()
            .filter(move |b| b.applies_to(business_type))
    }
}

const _: () = {
    let mut i = 0;
    while i < ExpenseBox::ALL.len() {
        assert!(ExpenseBox::ALL[i].ordinal() == i);
        i += 1;
    }
};

macro_rules! key_serde {
    ($ty:ty, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.key())
            }
        }

        impl FromStr for $ty {
            type Err = MtdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty>::from_key(s)
                    .ok_or_else(|| MtdError::Validation(format!("Unknown {} box '{s}'", $what)))
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.key())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

key_serde!(IncomeBox, "income");
key_serde!(ExpenseBox, "expense");

/// A reference to one box, tagged by kind (`{"boxKind": "expense", "boxKey": "travelCosts"}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "boxKind", content = "boxKey", rename_all = "lowercase")]
pub enum BoxRef {
    Income(IncomeBox),
    Expense(ExpenseBox),
}

impl BoxRef {
    pub fn kind(&self) -> &'static str {
        match self {
            BoxRef::Income(_) => "income",
            BoxRef::Expense(_) => "expense",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            BoxRef::Income(b) => b.key(),
            BoxRef::Expense(b) => b.key(),
        }
    }

    /// Rebuild from the `(kind, key)` pair used in storage.
    pub fn from_parts(kind: &str, key: &str) -> Result<Self, MtdError> {
        match kind {
            "income" => Ok(BoxRef::Income(key.parse()?)),
            "expense" => Ok(BoxRef::Expense(key.parse()?)),
            other => Err(MtdError::Validation(format!("Unknown box kind '{other}'"))),
        }
    }

    pub fn applies_to(&self, business_type: BusinessType) -> bool {
        match self {
            BoxRef::Income(_) => true,
            BoxRef::Expense(b) => b.applies_to(business_type),
        }
    }
}

impl fmt::Display for BoxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expense_keys_are_unique() {
        let mut keys: Vec<_> = ExpenseBox::ALL.iter().map(|b| b.key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), ExpenseBox::ALL.len());
    }

    #[test]
    fn keys_round_trip_through_from_key() {
        for b in ExpenseBox::ALL {
            assert_eq!(ExpenseBox::from_key(b.key()), Some(b));
        }
        assert_eq!(IncomeBox::from_key("turnover"), Some(IncomeBox::Turnover));
        assert!(ExpenseBox::from_key("consolidatedExpenses").is_none());
    }

    #[test]
    fn schema_sizes_per_business_type() {
        assert_eq!(
            ExpenseBox::for_business_type(BusinessType::SelfEmployment).count(),
            15
        );
        assert_eq!(
            ExpenseBox::for_business_type(BusinessType::UkProperty).count(),
            8
        );
        assert!(ExpenseBox::TravelCosts.applies_to(BusinessType::ForeignProperty));
        assert!(!ExpenseBox::TravelCosts.applies_to(BusinessType::SelfEmployment));
    }

    #[test]
    fn box_ref_is_adjacently_tagged() {
        let r = BoxRef::Expense(ExpenseBox::TravelCosts);
        let json = serde_json::to_value(r).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"boxKind": "expense", "boxKey": "travelCosts"})
        );
        let back: BoxRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
        assert_eq!(
            BoxRef::from_parts("income", "other").unwrap(),
            BoxRef::Income(IncomeBox::Other)
        );
    }
}
