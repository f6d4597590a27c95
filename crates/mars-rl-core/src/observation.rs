//! Observation representations and observation spaces

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Trait for observations from an environment
pub trait Observation: Clone + Debug + Send + Sync {
    /// Convert observation to a flat feature vector
    fn to_vec(&self) -> Vec<f64>;

    /// Get the shape of the observation
    fn shape(&self) -> Vec<usize>;
}

/// Trait for defining observation spaces
pub trait ObservationSpace: Send + Sync {
    /// The type of observations in this space
    type Observation: Observation;

    /// Check if an observation is valid within this space
    fn contains(&self, obs: &Self::Observation) -> bool;

    /// Get the shape of observations in this space
    fn shape(&self) -> Vec<usize>;

    /// Size of the flattened observation (product of the shape)
    fn flat_dim(&self) -> usize {
        self.shape().iter().product()
    }
}

/// Row-major 2D grid observation (for map-like environments)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridObservation {
    /// Cell values, row-major
    pub data: Vec<f64>,
    /// Number of rows
    pub height: usize,
    /// Number of columns
    pub width: usize,
}

impl GridObservation {
    /// Value at `(row, col)`, if in bounds
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.height && col < self.width {
            self.data.get(row * self.width + col).copied()
        } else {
            None
        }
    }
}

impl Observation for GridObservation {
    fn to_vec(&self) -> Vec<f64> {
        self.data.clone()
    }

    fn shape(&self) -> Vec<usize> {
        vec![self.height, self.width]
    }
}

/// Box observation space
#[derive(Debug, Clone)]
pub struct BoxObservationSpace {
    /// Lower bound shared by every cell
    pub low: f64,
    /// Upper bound shared by every cell
    pub high: f64,
    /// Shape of observations
    pub shape: Vec<usize>,
}

impl BoxObservationSpace {
    /// Create a new box observation space
    pub fn new(low: f64, high: f64, shape: Vec<usize>) -> crate::Result<Self> {
        if low > high {
            return Err(crate::RLError::Environment(format!(
                "observation bounds are inverted: low {low} > high {high}"
            )));
        }
        Ok(Self { low, high, shape })
    }
}

impl ObservationSpace for BoxObservationSpace {
    type Observation = GridObservation;

    fn contains(&self, obs: &Self::Observation) -> bool {
        obs.shape() == self.shape
            && obs.data.len() == self.flat_dim()
            && obs.data.iter().all(|x| *x >= self.low && *x <= self.high)
    }

    fn shape(&self) -> Vec<usize> {
        self.shape.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_dim_is_shape_product() {
        let space = BoxObservationSpace::new(0.0, 1.0, vec![21, 21]).unwrap();
        assert_eq!(space.flat_dim(), 441);
    }

    #[test]
    fn test_contains_checks_shape_and_bounds() {
        let space = BoxObservationSpace::new(0.0, 1.0, vec![2, 2]).unwrap();
        let ok = GridObservation { data: vec![0.0, 0.3, 0.6, 1.0], height: 2, width: 2 };
        let out_of_range = GridObservation { data: vec![0.0, 0.3, 0.6, 1.5], height: 2, width: 2 };
        let wrong_shape = GridObservation { data: vec![0.0; 6], height: 2, width: 3 };

        assert!(space.contains(&ok));
        assert!(!space.contains(&out_of_range));
        assert!(!space.contains(&wrong_shape));
        assert_eq!(ok.get(1, 0), Some(0.6));
        assert_eq!(ok.get(2, 0), None);
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        assert!(BoxObservationSpace::new(1.0, 0.0, vec![1]).is_err());
    }
}
