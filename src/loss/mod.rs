//! Per-iteration loss terms of body fitting.

pub mod aggregate;
pub mod overlap;

pub use crate::backend::{AutodiffBackend, Backend};
pub use aggregate::*;
pub use burn::tensor::{Bool, Tensor};
pub use overlap::*;

use crate::{body::to_host, error::Error};
use std::fmt;

/// A loss term with per-sample values and weights.
#[derive(Clone, Debug)]
pub struct LossTerm<B: Backend> {
    /// `[N]`
    pub value: Tensor<B, 1>,
    /// `[N]`
    pub weight: Tensor<B, 1>,
}

/// The loss terms of one iteration.
///
/// It is created by [`LossAggregator::evaluate`] and never mutated.
#[derive(Clone, Debug)]
pub struct LossTerms<B: Backend> {
    /// Absent when no landmarks are fitted.
    pub joint: Option<LossTerm<B>>,
    pub normal: LossTerm<B>,
    pub overlap: Overlap<B>,
    pub silhouette: LossTerm<B>,
}

/// Host values of [`LossTerms`] for logging.
#[derive(Clone, Debug, PartialEq)]
pub struct LossBreakdown {
    pub joint: Option<f32>,
    pub normal: f32,
    pub silhouette: f32,
    pub total: f32,
    /// Cloth overlap flags per sample.
    pub loose: Vec<bool>,
    /// Body overlap flags per sample.
    pub occluded: Vec<bool>,
}

impl<B: Backend> LossTerm<B> {
    /// `mean(value * weight)`
    ///
    /// The shape is `[1]`.
    #[inline]
    pub fn loss(&self) -> Tensor<B, 1> {
        (self.value.to_owned() * self.weight.to_owned()).mean()
    }
}

impl<B: Backend> LossTerms<B> {
    /// Sum of the weighted term means.
    ///
    /// The shape is `[1]`.
    pub fn total(&self) -> Tensor<B, 1> {
        let mut total = self.normal.loss() + self.silhouette.loss();
        if let Some(joint) = &self.joint {
            total = total + joint.loss();
        }
        total
    }

    pub fn breakdown(&self) -> Result<LossBreakdown, Error> {
        let scalar = |loss: Tensor<B, 1>| -> Result<f32, Error> {
            Ok(to_host(loss)?.first().copied().unwrap_or(f32::NAN))
        };
        let (loose, occluded) = self.overlap.flags.to_host()?;

        Ok(LossBreakdown {
            joint: self
                .joint
                .as_ref()
                .map(|joint| scalar(joint.loss()))
                .transpose()?,
            normal: scalar(self.normal.loss())?,
            silhouette: scalar(self.silhouette.loss())?,
            total: scalar(self.total())?,
            loose,
            occluded,
        })
    }
}

impl fmt::Display for LossBreakdown {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let flags = |flags: &[bool]| {
            flags.iter().map(|&flag| if flag { '1' } else { '0' }).collect::<String>()
        };

        write!(f, "normal: {:.3} | silhouette: {:.3} | ", self.normal, self.silhouette)?;
        if let Some(joint) = self.joint {
            write!(f, "joint: {joint:.3} | ")?;
        }
        write!(
            f,
            "Total: {:.3} | loose:{}, occluded:{}",
            self.total,
            flags(&self.loose),
            flags(&self.occluded),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_display() {
        let breakdown = LossBreakdown {
            joint: Some(0.25),
            normal: 0.1,
            silhouette: 0.02,
            total: 0.37,
            loose: vec![false, true],
            occluded: vec![false, false],
        };

        assert_eq!(
            breakdown.to_string(),
            "normal: 0.100 | silhouette: 0.020 | joint: 0.250 | Total: 0.370 | loose:01, occluded:00"
        );
    }

    #[test]
    fn breakdown_display_without_joint() {
        let breakdown = LossBreakdown {
            joint: None,
            normal: 0.0,
            silhouette: 1.0,
            total: 1.0,
            loose: vec![true],
            occluded: vec![true],
        };

        assert_eq!(
            breakdown.to_string(),
            "normal: 0.000 | silhouette: 1.000 | Total: 1.000 | loose:1, occluded:1"
        );
    }
}
