use serde::{Deserialize, Serialize};

/// Steady-state spoiled gradient echo signal model.
///
/// With `E = exp(-TR · R1)` the signal is proportional to
/// `f(E) = (1 - E) / (1 - cos(α) · E)`, and the longitudinal relaxation rate
/// grows linearly with concentration, `R1 = 1/T1 + r1 · C`. Relating every
/// frame to the pre-contrast baseline `S0` removes the unknown proton density.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalEquation {
    /// Repetition time (ms)
    pub repetition_time: f64,
    /// Flip angle (degrees)
    pub flip_angle: f64,
    /// Contrast agent relaxivity (1 / (mM · ms))
    pub relaxivity: f64,
}

impl SignalEquation {
    pub fn new(repetition_time: f64, flip_angle: f64, relaxivity: f64) -> Self {
        Self {
            repetition_time,
            flip_angle,
            relaxivity,
        }
    }

    #[inline]
    fn cos_alpha(&self) -> f64 {
        self.flip_angle.to_radians().cos()
    }

    #[inline]
    fn shape(&self, e: f64) -> f64 {
        (1.0 - e) / (1.0 - self.cos_alpha() * e)
    }

    /// Concentration giving `signal` for a voxel with baseline `s0` and
    /// pre-contrast relaxation time `t1` (ms).
    ///
    /// Returns `None` when the inputs fall outside the domain of the
    /// equation: non-positive signal or baseline, or a relaxation factor
    /// that is not in `(0, 1)`.
    pub fn concentration(&self, signal: f64, s0: f64, t1: f64) -> Option<f64> {
        if !(signal > 0.0 && s0 > 0.0 && t1 > 0.0) {
            return None;
        }
        let cos_alpha = self.cos_alpha();
        let e0 = (-self.repetition_time / t1).exp();
        let b = self.shape(e0);
        let ab = signal / s0 * b;

        let e = (1.0 - ab) / (1.0 - ab * cos_alpha);
        if !(e > 0.0 && e < 1.0) {
            return None;
        }

        let r1 = -e.ln() / self.repetition_time;
        let c = (r1 - 1.0 / t1) / self.relaxivity;
        c.is_finite().then_some(c)
    }

    /// Signal produced by `concentration`, the inverse of [Self::concentration]
    pub fn signal(&self, concentration: f64, s0: f64, t1: f64) -> f64 {
        let e0 = (-self.repetition_time / t1).exp();
        let r1 = 1.0 / t1 + self.relaxivity * concentration;
        let e = (-self.repetition_time * r1).exp();
        s0 * self.shape(e) / self.shape(e0)
    }
}
