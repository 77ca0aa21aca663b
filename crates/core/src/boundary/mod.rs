//! Service-area boundary validation.
//!
//! A cheap postal-code range check and a geocoded region check are merged
//! into one verdict with a confidence score:
//!
//! | postal vs geocoded            | result                           |
//! |-------------------------------|----------------------------------|
//! | geocoding failed              | postal result unchanged          |
//! | agree, geocoded ≥ 90          | agreed verdict, confidence 100   |
//! | disagree                      | geocoded verdict, confidence 75  |
//! | otherwise                     | mean confidence, valid if both   |

pub mod area;
pub mod validator;

pub use area::{PostalCode, PostalRange, ServiceArea};
pub use validator::{
    AGREEMENT_CONFIDENCE, APPROXIMATE_GEOCODING_CONFIDENCE, BOUNDARY_NAMESPACE, BoundaryValidator,
    DISAGREEMENT_CONFIDENCE, GEOCODING_CONFIDENCE, HIGH_CONFIDENCE_THRESHOLD, POSTAL_CODE_CONFIDENCE, ValidationMethod,
    ValidationResult, check_geocoded, check_postal_code, merge_results,
};
