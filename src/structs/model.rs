use serde::{Deserialize, Serialize};

pub type T = f64;
pub type State = ode_solvers::DVector<T>;

/// Right-hand side of a moment system: `(t, y, parameters, dy)`
pub type Rhs = fn(T, &State, &[T], &mut State);

/// A moment of the approximated distribution
///
/// `n_vector` holds one exponent per species. A single `1` marks the mean of that species; a
/// single entry `k >= 2` marks its `k`-th central moment. Mixed entries are cross moments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moment {
    pub symbol: String,
    pub n_vector: Vec<u32>,
}

impl Moment {
    pub fn new(symbol: impl Into<String>, n_vector: Vec<u32>) -> Self {
        Moment {
            symbol: symbol.into(),
            n_vector,
        }
    }

    pub fn order(&self) -> u32 {
        self.n_vector.iter().sum()
    }

    /// The species this moment belongs to, if it involves a single species
    pub fn species(&self) -> Option<usize> {
        let mut nonzero = self.n_vector.iter().enumerate().filter(|(_, &n)| n > 0);
        match (nonzero.next(), nonzero.next()) {
            (Some((species, _)), None) => Some(species),
            _ => None,
        }
    }
}

/// A moment-expansion (or linear noise) ODE system
#[derive(Debug, Clone)]
pub struct MomentModel {
    rhs: Rhs,
    moments: Vec<Moment>,
    parameters: Vec<String>,
}

impl MomentModel {
    pub fn new(rhs: Rhs, moments: Vec<Moment>, parameters: Vec<String>) -> Self {
        MomentModel {
            rhs,
            moments,
            parameters,
        }
    }

    pub fn rhs(&self) -> Rhs {
        self.rhs
    }

    pub fn number_of_equations(&self) -> usize {
        self.moments.len()
    }

    pub fn moments(&self) -> &[Moment] {
        &self.moments
    }

    pub fn symbols(&self) -> Vec<String> {
        self.moments.iter().map(|m| m.symbol.clone()).collect()
    }

    pub fn n_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameters
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.moments.iter().position(|m| m.symbol == symbol)
    }

    /// Index of the `order`-th central moment of `species`; `order == 1` is the mean
    pub fn central_moment(&self, species: usize, order: u32) -> Option<usize> {
        self.moments
            .iter()
            .position(|m| m.species() == Some(species) && m.order() == order)
    }

    pub fn mean_of(&self, species: usize) -> Option<usize> {
        self.central_moment(species, 1)
    }

    pub fn variance_of(&self, species: usize) -> Option<usize> {
        self.central_moment(species, 2)
    }
}
