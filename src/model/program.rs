use super::bom::Bom;
use crate::core::errors::ConfigError;
use crate::core::types::{SimTime, SECS_PER_HOUR};
use std::collections::BTreeMap;

/// Named production recipe, immutable after load
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub id: String,
    pub bom: String,
    pub duration_secs: SimTime,
    /// Thermal units accrued per production hour
    pub temperature_factor: f64,
    pub params: BTreeMap<String, f64>,
}

/// Programs and BOMs by id
#[derive(Debug, Clone, Default)]
pub struct ProgramBook {
    programs: BTreeMap<String, Program>,
    boms: BTreeMap<String, Bom>,
}

impl ProgramBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bom(&mut self, bom: Bom) -> Result<(), ConfigError> {
        bom.validate()?;
        if self.boms.contains_key(&bom.id) {
            return Err(ConfigError::DuplicateId { kind: "bom", id: bom.id });
        }
        self.boms.insert(bom.id.clone(), bom);
        Ok(())
    }

    pub fn add_program(&mut self, program: Program) -> Result<(), ConfigError> {
        if !self.boms.contains_key(&program.bom) {
            return Err(ConfigError::unknown("program", &program.id, "bom", &program.bom));
        }
        if program.duration_secs == 0 {
            return Err(ConfigError::invalid(
                format!("program '{}' duration", program.id),
                "must be positive",
            ));
        }
        if self.programs.contains_key(&program.id) {
            return Err(ConfigError::DuplicateId { kind: "program", id: program.id });
        }
        self.programs.insert(program.id.clone(), program);
        Ok(())
    }

    pub fn program(&self, id: &str) -> Option<&Program> {
        self.programs.get(id)
    }

    pub fn bom(&self, id: &str) -> Option<&Bom> {
        self.boms.get(id)
    }

    /// Program together with its BOM
    pub fn recipe(&self, program: &str) -> Option<(&Program, &Bom)> {
        let program = self.programs.get(program)?;
        let bom = self.boms.get(&program.bom)?;
        Some((program, bom))
    }

    /// Output per hour of uninterrupted production
    pub fn max_hourly_output(&self, program: &str, product: &str) -> f64 {
        match self.recipe(program) {
            Some((p, bom)) => {
                bom.output_quantity(product) * SECS_PER_HOUR as f64 / p.duration_secs as f64
            }
            None => 0.0,
        }
    }
}
