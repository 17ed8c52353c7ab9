use serde::{Deserialize, Serialize};

/// A dense embedding vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self { data: vec![0.0; dim] }
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn dot(&self, other: &Vector) -> f32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    #[inline]
    pub fn norm(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Cosine similarity, 0.0 for mismatched dimensions or zero vectors
    #[inline]
    pub fn cosine_similarity(&self, other: &Vector) -> f32 {
        if self.dim() != other.dim() {
            return 0.0;
        }

        let norm_a = self.norm();
        let norm_b = other.norm();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        self.dot(other) / (norm_a * norm_b)
    }

    /// Squared L2 distance, infinite for mismatched dimensions
    #[inline]
    pub fn squared_l2_distance(&self, other: &Vector) -> f32 {
        if self.dim() != other.dim() {
            return f32::INFINITY;
        }

        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum()
    }

    #[inline]
    pub fn l2_distance(&self, other: &Vector) -> f32 {
        self.squared_l2_distance(other).sqrt()
    }

    /// Normalize the vector to unit length. Zero vectors are left untouched.
    #[inline]
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > f32::EPSILON {
            let inv_norm = 1.0 / norm;
            for x in &mut self.data {
                *x *= inv_norm;
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut v = self.clone();
        v.normalize();
        v
    }
}
