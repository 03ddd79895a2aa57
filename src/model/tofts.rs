use crate::model::ModelVariant;

/// Forward (extended) Tofts model on a fixed time grid.
///
/// The tissue concentration is
///
/// ```text
/// Ct(t) = Ktrans ∫ Cp(τ) exp(-kep (t - τ)) dτ  +  Fpv Cp(t),   kep = Ktrans / Ve
/// ```
///
/// The convolution is evaluated recursively, frame by frame. Between two frames
/// the AIF is taken as linear and the exponential kernel is integrated exactly
/// over the segment, so the prediction stays accurate when `kep` is large
/// compared to the frame spacing. Non-uniform spacing is supported. Times are
/// in minutes.
#[derive(Debug, Clone, Copy)]
pub struct ToftsModel<'a> {
    variant: ModelVariant,
    times: &'a [f64],
    aif: &'a [f64],
}

impl<'a> ToftsModel<'a> {
    /// # Panics
    ///
    /// Panics if `times` and `aif` have different lengths.
    pub fn new(variant: ModelVariant, times: &'a [f64], aif: &'a [f64]) -> Self {
        assert_eq!(
            times.len(),
            aif.len(),
            "times and AIF must have the same length"
        );
        Self {
            variant,
            times,
            aif,
        }
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Predicted tissue concentration for parameters in optimizer order
    pub fn predict(&self, params: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.times.len()];
        self.predict_into(params, &mut out);
        out
    }

    pub fn predict_into(&self, params: &[f64], out: &mut [f64]) {
        let ktrans = params[0];
        let ve = params[1];
        let fpv = match self.variant {
            ModelVariant::Tofts2 => 0.0,
            ModelVariant::Tofts3 => params[2],
        };
        let kep = if ve > 0.0 { ktrans / ve } else { 0.0 };

        if self.times.is_empty() {
            return;
        }

        let mut convolution = 0.0;
        out[0] = fpv * self.aif[0];
        for i in 1..self.times.len() {
            let (decay, w_prev, w_curr) = segment_weights(kep, self.times[i] - self.times[i - 1]);
            convolution = convolution * decay + w_prev * self.aif[i - 1] + w_curr * self.aif[i];
            out[i] = ktrans * convolution + fpv * self.aif[i];
        }
    }
}

/// Decay over one segment of length `dt` and the weights of its start and end
/// AIF samples in `∫ exp(-kep (dt - s)) Cp(s) ds` for a linear `Cp`.
///
/// Small `kep * dt` uses the series expansion, which tends to the trapezoidal
/// weights `dt / 2`.
fn segment_weights(kep: f64, dt: f64) -> (f64, f64, f64) {
    let x = kep * dt;
    let decay = (-x).exp();
    let (whole, ramp) = if x < 1e-4 {
        (
            dt * (1.0 - x / 2.0 + x * x / 6.0),
            dt * (0.5 - x / 3.0 + x * x / 8.0),
        )
    } else {
        ((1.0 - decay) / kep, (1.0 - decay * (1.0 + x)) / (kep * x))
    };
    (decay, ramp, whole - ramp)
}
