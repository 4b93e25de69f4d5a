/// Probability density with an explicit tag for Dirac distributions. An
/// infinite density stores the coefficient of the delta, not a magnitude.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbabilityDensity {
    pub value: f32,
    pub is_finite: bool,
}

impl ProbabilityDensity {
    pub fn finite(value: f32) -> Self {
        Self {
            value,
            is_finite: true,
        }
    }

    pub fn dirac(value: f32) -> Self {
        Self {
            value,
            is_finite: false,
        }
    }
}

/// Density of a sampled direction with respect to both the solid-angle and
/// the projected-solid-angle measure.
///
/// The two are redundant for finite distributions (`p_projected * cos(theta)
/// = p_solid`), but carrying both keeps perfectly specular distributions
/// representable: when the projected density is unbounded its value field is
/// fixed at 1 and the solid-angle value stores `cos(theta_0)` of the specular
/// direction, so the identity above still holds coefficient-wise and ratios
/// of the two measures cancel without ever materializing an infinity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalPdf {
    pub per_solid_angle: ProbabilityDensity,
    pub per_projected_solid_angle: ProbabilityDensity,
}

impl DirectionalPdf {
    pub fn is_valid(&self) -> bool {
        if self.per_solid_angle.value < 0.0 || self.per_projected_solid_angle.value < 0.0 {
            return false;
        }
        if !self.per_projected_solid_angle.is_finite && self.per_projected_solid_angle.value != 1.0
        {
            return false;
        }
        // With unit coefficient on the projected delta, the solid-angle
        // coefficient is a cosine and cannot exceed 1.
        if !self.per_solid_angle.is_finite && self.per_solid_angle.value > 1.0 {
            return false;
        }
        true
    }
}
