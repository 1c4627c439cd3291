use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Closing sentence of every recommendation.
pub const DISCLAIMER: &str =
    "This is an AI-assisted analysis and should not be considered a final diagnosis.";

/// The seven lesion classes, declared in the order of the model's output vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkinCondition {
    ActinicKeratoses,
    BasalCellCarcinoma,
    BenignKeratosis,
    Dermatofibroma,
    Melanoma,
    MelanocyticNevi,
    VascularLesions,
}

impl SkinCondition {
    pub const COUNT: usize = 7;

    pub const ALL: [SkinCondition; Self::COUNT] = [
        SkinCondition::ActinicKeratoses,
        SkinCondition::BasalCellCarcinoma,
        SkinCondition::BenignKeratosis,
        SkinCondition::Dermatofibroma,
        SkinCondition::Melanoma,
        SkinCondition::MelanocyticNevi,
        SkinCondition::VascularLesions,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::ActinicKeratoses => "Actinic Keratoses / Bowen's Disease",
            Self::BasalCellCarcinoma => "Basal Cell Carcinoma",
            Self::BenignKeratosis => "Benign Keratosis-like Lesions",
            Self::Dermatofibroma => "Dermatofibroma",
            Self::Melanoma => "Melanoma",
            Self::MelanocyticNevi => "Melanocytic Nevi (moles)",
            Self::VascularLesions => "Vascular Lesions",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.label() == label)
    }

    pub fn info(self) -> &'static ConditionInfo {
        &CATALOG[&self]
    }

    pub fn description(self) -> &'static str {
        &self.info().description
    }

    pub fn recommendation(self) -> &'static str {
        &self.info().recommendation
    }
}

impl fmt::Display for SkinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionInfo {
    pub description: String,
    pub recommendation: String,
}

lazy_static! {
    static ref CATALOG: HashMap<SkinCondition, ConditionInfo> = SkinCondition::ALL
        .iter()
        .map(|&condition| {
            let info = ConditionInfo {
                description: description_text(condition).to_string(),
                recommendation: format!("{}\n\nNote: {DISCLAIMER}", advice_text(condition)),
            };
            (condition, info)
        })
        .collect();
}

fn description_text(condition: SkinCondition) -> &'static str {
    match condition {
        SkinCondition::ActinicKeratoses => concat!(
            "Actinic Keratoses are pre-cancerous skin growths that typically appear on sun-damaged skin. ",
            "They often present as rough, scaly patches that can be pink, red, or flesh-colored. ",
            "Bowen's Disease is an early form of skin cancer that appears as a persistent, scaly red patch."
        ),
        SkinCondition::BasalCellCarcinoma => concat!(
            "Basal Cell Carcinoma is the most common form of skin cancer. It typically appears as a ",
            "pearly, waxy bump; a flat, flesh-colored or brown scar-like lesion; or a bleeding or ",
            "scabbing sore that heals and returns. It's usually found on sun-exposed areas."
        ),
        SkinCondition::BenignKeratosis => concat!(
            "Benign Keratosis-like Lesions are non-cancerous skin growths that often appear with age. ",
            "They can be flat or slightly raised, with colors ranging from light tan to dark brown. ",
            "These lesions are harmless but may resemble more serious conditions."
        ),
        SkinCondition::Dermatofibroma => concat!(
            "Dermatofibroma is a common benign skin tumor that often appears as a firm, raised growth ",
            "that can be pink, gray, red, or brown. They're usually round, relatively small, and may ",
            "dimple when pressed from the sides."
        ),
        SkinCondition::Melanoma => concat!(
            "Melanoma is the most dangerous form of skin cancer. It develops in melanocytes (pigment-producing cells) ",
            "and often resembles moles. Key warning signs include asymmetry, irregular borders, color ",
            "variations, diameter >6mm, and evolving size/shape/color."
        ),
        SkinCondition::MelanocyticNevi => concat!(
            "Melanocytic Nevi (moles) are common, usually benign skin growths that develop from melanocytes. ",
            "They can be flat or raised, round or oval, and range in color from pink to dark brown. ",
            "While most are harmless, any changes should be monitored."
        ),
        SkinCondition::VascularLesions => concat!(
            "Vascular Lesions are abnormalities of blood vessels appearing on or under the skin. ",
            "They can appear as red, purple, or blue marks and may be flat or raised. Types include ",
            "hemangiomas, port wine stains, and spider veins."
        ),
    }
}

// Recommendation body without the trailing disclaimer note.
fn advice_text(condition: SkinCondition) -> &'static str {
    match condition {
        SkinCondition::ActinicKeratoses => concat!(
            "ATTENTION: Actinic Keratoses detected, which may develop into skin cancer.\n\n",
            "Recommended actions:\n",
            "1. Schedule an appointment with a dermatologist\n",
            "2. Protect the affected area from sun exposure\n",
            "3. Use prescribed sunscreen regularly\n",
            "4. Monitor for any changes in size or appearance"
        ),
        SkinCondition::BasalCellCarcinoma => concat!(
            "URGENT: The AI model suggests this may be Basal Cell Carcinoma, a type of skin cancer.\n\n",
            "Recommended actions:\n",
            "1. Schedule an immediate appointment with a dermatologist\n",
            "2. Do not delay seeking professional medical attention\n",
            "3. Bring this image and analysis to your appointment\n",
            "4. Avoid sun exposure to the affected area"
        ),
        SkinCondition::BenignKeratosis => concat!(
            "The AI model suggests these are benign (non-cancerous) growths.\n\n",
            "Recommended actions:\n",
            "1. Monitor the lesions for any changes\n",
            "2. Schedule a routine check-up with a dermatologist\n",
            "3. Protect your skin from sun damage\n",
            "4. Document any changes in size or appearance"
        ),
        SkinCondition::Dermatofibroma => concat!(
            "The AI model suggests this may be a Dermatofibroma, which is typically benign.\n\n",
            "Recommended actions:\n",
            "1. No immediate action required if stable\n",
            "2. Monitor for any changes in size or color\n",
            "3. Consider a routine dermatologist check-up\n",
            "4. Document any changes or symptoms"
        ),
        SkinCondition::Melanoma => concat!(
            "URGENT: The AI model suggests this may be Melanoma, a serious form of skin cancer.\n\n",
            "Recommended actions:\n",
            "1. Seek IMMEDIATE medical attention\n",
            "2. Schedule an emergency appointment with a dermatologist\n",
            "3. Bring this image and analysis to your appointment\n",
            "4. Do not delay - early treatment is crucial"
        ),
        SkinCondition::MelanocyticNevi => concat!(
            "The AI model suggests this is a common mole (Melanocytic Nevus).\n\n",
            "Recommended actions:\n",
            "1. Regular self-monitoring using the ABCDE rule:\n",
            "   - Asymmetry\n",
            "   - Border irregularity\n",
            "   - Color variation\n",
            "   - Diameter > 6mm\n",
            "   - Evolving size/shape\n",
            "2. Annual skin check with a dermatologist\n",
            "3. Protect from sun exposure"
        ),
        SkinCondition::VascularLesions => concat!(
            "The AI model suggests this may be a vascular lesion.\n\n",
            "Recommended actions:\n",
            "1. Schedule a consultation with a dermatologist\n",
            "2. Monitor for any changes in size or color\n",
            "3. Document any associated symptoms\n",
            "4. Protect the area from injury"
        ),
    }
}
