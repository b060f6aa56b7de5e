//! Adam optimizer with the AMSGrad variant.

pub use super::*;

#[derive(Config, Copy, Debug, PartialEq)]
pub struct AdamConfig {
    #[config(default = "0.9")]
    pub beta_1: f64,

    #[config(default = "0.999")]
    pub beta_2: f64,

    #[config(default = "1e-8")]
    pub epsilon: f64,

    /// Normalizing by the running maximum of the 2nd moment.
    #[config(default = true)]
    pub is_amsgrad: bool,
}

/// Adam optimizer for one tensor.
///
/// The moments live on the inner backend.
/// They are created by the first update and dropped with the optimizer.
#[derive(Clone, Debug)]
pub struct Adam<B: Backend, const D: usize> {
    pub config: AdamConfig,
    pub state: Option<AdamState<B, D>>,
}

#[derive(Clone, Debug)]
pub struct AdamState<B: Backend, const D: usize> {
    pub moment_1: Tensor<B, D>,
    pub moment_2: Tensor<B, D>,
    pub moment_2_max: Tensor<B, D>,
    pub time: u64,
}

impl AdamConfig {
    pub fn init<B: Backend, const D: usize>(&self) -> Adam<B, D> {
        Adam {
            config: *self,
            state: None,
        }
    }
}

impl<B: Backend, const D: usize> Adam<B, D> {
    /// Updating the value with the gradient.
    ///
    /// `value_t = value_(t-1) - lr / (1 - beta_1^t) * m_t / (sqrt(v_t / (1 - beta_2^t)) + epsilon)`
    ///
    /// where `v_t` is the running maximum for AMSGrad.
    pub fn update(
        &mut self,
        learning_rate: LearningRateValue,
        value: Tensor<B, D>,
        grad: Tensor<B, D>,
    ) -> Tensor<B, D> {
        let AdamConfig {
            beta_1,
            beta_2,
            epsilon,
            is_amsgrad,
        } = self.config;

        let AdamState {
            moment_1,
            moment_2,
            moment_2_max,
            time,
        } = match self.state.take() {
            Some(state) => state,
            None => {
                let zeros = grad.zeros_like();
                AdamState {
                    moment_1: zeros.to_owned(),
                    moment_2: zeros.to_owned(),
                    moment_2_max: zeros,
                    time: 0,
                }
            },
        };

        let time = time + 1;
        let moment_1 = moment_1
            .mul_scalar(beta_1)
            .add(grad.to_owned().mul_scalar(1.0 - beta_1));
        let moment_2 = moment_2
            .mul_scalar(beta_2)
            .add(grad.powf_scalar(2.0).mul_scalar(1.0 - beta_2));
        let moment_2_max = if is_amsgrad {
            let is_greater = moment_2.to_owned().greater(moment_2_max.to_owned());
            moment_2_max.mask_where(is_greater, moment_2.to_owned())
        } else {
            moment_2.to_owned()
        };

        let bias_correction_1 = 1.0 - beta_1.powi(time as i32);
        let bias_correction_2 = 1.0 - beta_2.powi(time as i32);
        let denominator = moment_2_max
            .to_owned()
            .sqrt()
            .div_scalar(bias_correction_2.sqrt())
            .add_scalar(epsilon);
        let value = value.sub(
            moment_1
                .to_owned()
                .div(denominator)
                .mul_scalar(learning_rate / bias_correction_1),
        );

        self.state = Some(AdamState {
            moment_1,
            moment_2,
            moment_2_max,
            time,
        });

        value
    }

    /// Updating the tracked value with its gradient in `grads`.
    ///
    /// The value is returned as is if it has no gradient.
    pub fn step<AB: AutodiffBackend<InnerBackend = B>>(
        &mut self,
        learning_rate: LearningRateValue,
        value: Tensor<AB, D>,
        grads: &AB::Gradients,
    ) -> Tensor<AB, D> {
        match value.grad(grads) {
            Some(grad) => Tensor::from_inner(self.update(
                learning_rate,
                value.inner(),
                grad,
            ))
            .require_grad(),
            None => value,
        }
    }

    /// Number of updates applied.
    #[inline]
    pub fn time(&self) -> u64 {
        self.state.as_ref().map(|state| state.time).unwrap_or_default()
    }
}

impl Default for AdamConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend, const D: usize> Default for Adam<B, D> {
    #[inline]
    fn default() -> Self {
        AdamConfig::default().init()
    }
}
