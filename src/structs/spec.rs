use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

/// A single value together with its variability flag
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub value: f64,
    pub variable: bool,
}

impl Slot {
    pub fn fixed(value: f64) -> Self {
        Slot {
            value,
            variable: false,
        }
    }

    pub fn variable(value: f64) -> Self {
        Slot {
            value,
            variable: true,
        }
    }
}

/// An ordered sequence of [Slot]s
///
/// Used both for kinetic parameters and for initial conditions. Fixed slots are held at their
/// value during optimization, variable slots are free.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SlotSpec {
    slots: Vec<Slot>,
}

pub type ParameterSpec = SlotSpec;
pub type InitialConditionSpec = SlotSpec;

impl SlotSpec {
    pub fn new(slots: Vec<Slot>) -> Self {
        SlotSpec { slots }
    }

    pub fn from_pairs(pairs: &[(f64, bool)]) -> Self {
        SlotSpec {
            slots: pairs
                .iter()
                .map(|&(value, variable)| Slot { value, variable })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn values(&self) -> Vec<f64> {
        self.slots.iter().map(|s| s.value).collect()
    }

    /// The variability mask, one flag per slot
    pub fn mask(&self) -> Vec<bool> {
        self.slots.iter().map(|s| s.variable).collect()
    }

    /// Positions of the variable slots
    pub fn variable_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.variable)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn n_variable(&self) -> usize {
        self.slots.iter().filter(|s| s.variable).count()
    }

    /// Values of the variable slots only, in order
    pub fn reduce(&self) -> Vec<f64> {
        self.slots
            .iter()
            .filter(|s| s.variable)
            .map(|s| s.value)
            .collect()
    }

    /// Rebuild the full value vector, taking variable slots from `reduced` and fixed slots from `self`
    ///
    /// `reduced` must hold exactly [SlotSpec::n_variable] values.
    pub fn expand(&self, reduced: &[f64]) -> Vec<f64> {
        let mut free = reduced.iter();
        self.slots
            .iter()
            .map(|s| match s.variable {
                true => free.next().copied().unwrap_or(s.value),
                false => s.value,
            })
            .collect()
    }

    /// A copy of this spec with the values of the variable slots replaced by `reduced`
    pub fn with_variable_values(&self, reduced: &[f64]) -> SlotSpec {
        let values = self.expand(reduced);
        SlotSpec {
            slots: self
                .slots
                .iter()
                .zip(values)
                .map(|(s, value)| Slot {
                    value,
                    variable: s.variable,
                })
                .collect(),
        }
    }

    /// Extend the spec to `required` slots by appending fixed zeros
    ///
    /// Moment closure introduces higher-order equations that the data rarely specifies; those start
    /// at zero and are never optimized. Fails if the spec already holds more than `required` slots.
    pub fn pad_to(&self, required: usize) -> Result<SlotSpec, InferenceError> {
        if self.slots.len() > required {
            return Err(InferenceError::DimensionMismatch {
                what: "initial conditions",
                expected: required,
                found: self.slots.len(),
            });
        }
        let mut slots = self.slots.clone();
        slots.resize(required, Slot::fixed(0.0));
        Ok(SlotSpec { slots })
    }
}

/// Pad `initial_conditions` with fixed zeros up to the model's number of equations
pub fn pad_initial_conditions(
    initial_conditions: &InitialConditionSpec,
    number_of_equations: usize,
) -> Result<InitialConditionSpec, InferenceError> {
    initial_conditions.pad_to(number_of_equations)
}

/// Identifies a slot in either the parameter or the initial-condition spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SlotId {
    Parameter(usize),
    InitialCondition(usize),
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotId::Parameter(i) => write!(f, "parameter {}", i),
            SlotId::InitialCondition(i) => write!(f, "initial condition {}", i),
        }
    }
}

/// Closed interval for a slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub fn new(lower: f64, upper: f64) -> Self {
        Bounds { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Distance from `value` to the interval, zero inside
    pub fn violation(&self, value: f64) -> f64 {
        if value < self.lower {
            self.lower - value
        } else if value > self.upper {
            value - self.upper
        } else {
            0.0
        }
    }
}

/// Box constraints for parameter and initial-condition slots
///
/// Slots without an entry are unconstrained.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoxConstraints {
    bounds: BTreeMap<SlotId, Bounds>,
}

impl BoxConstraints {
    pub fn new() -> Self {
        BoxConstraints::default()
    }

    pub fn with(mut self, slot: SlotId, lower: f64, upper: f64) -> Self {
        self.insert(slot, Bounds::new(lower, upper));
        self
    }

    pub fn insert(&mut self, slot: SlotId, bounds: Bounds) {
        self.bounds.insert(slot, bounds);
    }

    pub fn get(&self, slot: SlotId) -> Option<&Bounds> {
        self.bounds.get(&slot)
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotId, &Bounds)> {
        self.bounds.iter()
    }

    /// Fails on the first slot whose bounds are not finite or have `lower > upper`
    pub fn validate(&self) -> Result<(), InferenceError> {
        for (&slot, b) in &self.bounds {
            if !(b.lower <= b.upper) || !b.lower.is_finite() || !b.upper.is_finite() {
                return Err(InferenceError::InvalidSlotBounds {
                    slot,
                    lower: b.lower,
                    upper: b.upper,
                });
            }
        }
        Ok(())
    }
}

/// One concrete starting point for a single optimization
#[derive(Debug, Clone, PartialEq)]
pub struct StartingPoint {
    pub parameters: ParameterSpec,
    pub initial_conditions: InitialConditionSpec,
}
