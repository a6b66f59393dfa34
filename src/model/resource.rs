use crate::core::types::SimTime;
use serde::{Deserialize, Serialize};

/// Kind of content a container can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Material,
    Consumable,
    Product,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Material => "material",
            ContentKind::Consumable => "consumable",
            ContentKind::Product => "product",
        }
    }
}

/// Immutable definition of a material, consumable or product
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDef {
    pub id: String,
    pub name: String,
    pub kind: ContentKind,
}

/// A delivered or produced quantity with its quality record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub batch_id: String,
    pub quantity: f64,
    /// 0.0 (worthless) ..= 1.0 (perfect)
    pub quality: f64,
    /// Raw units needed per effective unit, never below 1
    pub consumption_factor: f64,
    pub created_at: SimTime,
    /// Quality check verdict for produced batches
    pub passed: Option<bool>,
}

impl Batch {
    pub fn new(batch_id: impl Into<String>, quantity: f64, created_at: SimTime) -> Self {
        Self {
            batch_id: batch_id.into(),
            quantity,
            quality: 1.0,
            consumption_factor: 1.0,
            created_at,
            passed: None,
        }
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality.clamp(0.0, 1.0);
        self
    }

    pub fn with_consumption_factor(mut self, factor: f64) -> Self {
        self.consumption_factor = factor.max(1.0);
        self
    }

    pub fn with_verdict(mut self, passed: bool) -> Self {
        self.passed = Some(passed);
        self
    }

    /// Quantity usable by production once the consumption factor is applied
    pub fn effective_quantity(&self) -> f64 {
        self.quantity / self.consumption_factor
    }
}

/// Portion of a batch taken out of a container
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnPortion {
    pub batch_id: String,
    pub quantity: f64,
    pub effective: f64,
    pub quality: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_quantity() {
        let batch = Batch::new("b", 12.0, 0).with_consumption_factor(1.5);
        assert_eq!(batch.effective_quantity(), 8.0);
    }

    #[test]
    fn test_builders_clamp() {
        let batch = Batch::new("b", 1.0, 0)
            .with_quality(1.7)
            .with_consumption_factor(0.2);
        assert_eq!(batch.quality, 1.0);
        assert_eq!(batch.consumption_factor, 1.0);
    }
}
