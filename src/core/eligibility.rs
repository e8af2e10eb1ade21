use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::{EligibilityResult, Group, HireEra};

const ANY_AGE_SERVICE_YEARS: Decimal = dec!(20);
const MINIMUM_SERVICE_YEARS: Decimal = dec!(10);
const PRE_2012_MINIMUM_AGE: u32 = 55;

/// Statutory age floor for members hired on or after April 2, 2012.
fn post_2012_minimum_age(group: Group) -> Option<u32> {
    match group {
        Group::Group1 => Some(60),
        Group::Group2 => Some(55),
        Group::Group3 => None,
        Group::Group4 => Some(50),
    }
}

pub fn check_eligibility(
    age: u32,
    years_of_service: Decimal,
    group: Group,
    hire_era: HireEra,
) -> EligibilityResult {
    let yos = years_of_service.normalize();
    match hire_era {
        HireEra::Before2012 => {
            if years_of_service >= ANY_AGE_SERVICE_YEARS {
                eligible(format!(
                    "Eligible at any age with {yos} years of creditable service (20 required)"
                ))
            } else if age >= PRE_2012_MINIMUM_AGE && years_of_service >= MINIMUM_SERVICE_YEARS {
                eligible(format!(
                    "Eligible at age {age} with {yos} years of creditable service"
                ))
            } else if age >= PRE_2012_MINIMUM_AGE {
                ineligible(format!(
                    "Requires at least 10 years of creditable service at age 55 or older; have {yos}"
                ))
            } else {
                ineligible(format!(
                    "Requires 20 years of service at any age, or age 55 with 10 years; \
                     have {yos} years at age {age}"
                ))
            }
        }
        HireEra::After2012 => {
            if years_of_service < MINIMUM_SERVICE_YEARS {
                return ineligible(format!(
                    "Members hired on or after April 2, 2012 need at least 10 years of \
                     creditable service; have {yos}"
                ));
            }
            match post_2012_minimum_age(group) {
                Some(minimum) if age < minimum => ineligible(format!(
                    "{} members hired on or after April 2, 2012 must be at least {minimum}; \
                     age is {age}",
                    group.label()
                )),
                _ => eligible(format!(
                    "Eligible at age {age} with {yos} years of creditable service"
                )),
            }
        }
    }
}

fn eligible(reason: String) -> EligibilityResult {
    EligibilityResult {
        eligible: true,
        reason,
    }
}

fn ineligible(reason: String) -> EligibilityResult {
    EligibilityResult {
        eligible: false,
        reason,
    }
}
