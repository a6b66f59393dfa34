use super::resource::DrawnPortion;
use crate::core::errors::ConfigError;

/// Input needed per production run, in effective units
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub content: String,
    pub consumption: f64,
}

/// Output of one production run
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub content: String,
    pub quantity: f64,
}

/// Bill of materials for one production run
#[derive(Debug, Clone, PartialEq)]
pub struct Bom {
    pub id: String,
    pub materials: Vec<Requirement>,
    pub consumables: Vec<Requirement>,
    pub products: Vec<Output>,
}

impl Bom {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for req in self.inputs() {
            if !(req.consumption >= 0.0) || !req.consumption.is_finite() {
                return Err(ConfigError::invalid(
                    format!("bom '{}' consumption of '{}'", self.id, req.content),
                    "must be a non-negative number",
                ));
            }
        }
        for out in &self.products {
            if !(out.quantity >= 0.0) || !out.quantity.is_finite() {
                return Err(ConfigError::invalid(
                    format!("bom '{}' output of '{}'", self.id, out.content),
                    "must be a non-negative number",
                ));
            }
        }
        Ok(())
    }

    /// Materials followed by consumables
    pub fn inputs(&self) -> impl Iterator<Item = &Requirement> {
        self.materials.iter().chain(self.consumables.iter())
    }

    /// Quantities to draw for `fraction` of one run
    pub fn requirements_for(&self, fraction: f64) -> Vec<(&str, f64)> {
        self.inputs()
            .filter(|req| req.consumption > 0.0)
            .map(|req| (req.content.as_str(), req.consumption * fraction))
            .collect()
    }

    pub fn is_material(&self, content: &str) -> bool {
        self.materials.iter().any(|m| m.content == content)
    }

    pub fn output_quantity(&self, product: &str) -> f64 {
        self.products
            .iter()
            .filter(|o| o.content == product)
            .map(|o| o.quantity)
            .sum()
    }
}

/// Running quantity-weighted mean of consumed material quality
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QualityAccumulator {
    weighted: f64,
    quantity: f64,
}

impl QualityAccumulator {
    pub fn add(&mut self, portions: &[DrawnPortion]) {
        for p in portions {
            self.weighted += p.effective * p.quality;
            self.quantity += p.effective;
        }
    }

    /// Perfect quality when nothing weighed in
    pub fn value(&self) -> f64 {
        if self.quantity <= 0.0 {
            1.0
        } else {
            (self.weighted / self.quantity).clamp(0.0, 1.0)
        }
    }
}
