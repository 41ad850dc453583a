//! Categorical feature encodings for the yield regressor.
//!
//! The codes must match the ones the regressor was fitted with. Names that
//! are not in a table encode as 0.

/// Tamil Nadu districts
pub const DISTRICTS: [&str; 18] = [
    "Coimbatore",
    "Chennai",
    "Madurai",
    "Tiruchirappalli",
    "Salem",
    "Tirunelveli",
    "Erode",
    "Thanjavur",
    "Vellore",
    "Kancheepuram",
    "Cuddalore",
    "Dindigul",
    "Krishnagiri",
    "Nagapattinam",
    "Ramanathapuram",
    "Sivaganga",
    "Theni",
    "Virudhunagar",
];

pub const SOIL_TYPES: [&str; 7] = [
    "Black Soil",
    "Red Soil",
    "Alluvial Soil",
    "Laterite Soil",
    "Clay Soil",
    "Sandy Soil",
    "Loamy Soil",
];

pub const CROPS: [&str; 12] = [
    "Rice",
    "Wheat",
    "Maize",
    "Sugarcane",
    "Cotton",
    "Groundnut",
    "Millets",
    "Pulses",
    "Banana",
    "Coconut",
    "Turmeric",
    "Tea",
];

/// Number of features fed to the regressor
pub const NUM_FEATURES: usize = 5;

fn encode(table: &[&str], name: &str) -> f64 {
    table.iter().position(|entry| *entry == name).unwrap_or(0) as f64
}

pub fn encode_district(name: &str) -> f64 {
    encode(&DISTRICTS, name)
}

pub fn encode_soil_type(name: &str) -> f64 {
    encode(&SOIL_TYPES, name)
}

pub fn encode_crop(name: &str) -> f64 {
    encode(&CROPS, name)
}

/// `[district, soil_type, crop, rainfall, temperature]`
pub fn feature_row(
    district: &str,
    soil_type: &str,
    crop: &str,
    rainfall: f64,
    temperature: f64,
) -> [f64; NUM_FEATURES] {
    [
        encode_district(district),
        encode_soil_type(soil_type),
        encode_crop(crop),
        rainfall,
        temperature,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(encode_district("Coimbatore"), 0.0);
        assert_eq!(encode_district("Virudhunagar"), 17.0);
        assert_eq!(encode_soil_type("Loamy Soil"), 6.0);
        assert_eq!(encode_crop("Tea"), 11.0);
    }

    #[test]
    fn test_unknown_names_encode_as_zero() {
        assert_eq!(encode_district("Bengaluru"), 0.0);
        assert_eq!(encode_soil_type("Loamy"), 0.0);
        assert_eq!(encode_crop("rice"), 0.0);
    }

    #[test]
    fn test_feature_row_order() {
        let row = feature_row("Madurai", "Red Soil", "Cotton", 120.5, 31.0);
        assert_eq!(row, [2.0, 1.0, 4.0, 120.5, 31.0]);
    }
}
