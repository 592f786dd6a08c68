use fixed::types::I32F32;

const MM_PER_INCH: f64 = 25.4;
const PT_PER_INCH: f64 = 72.0;

/// PDF user-space length in points, stored as fixed-point so that the same
/// input always serializes to the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));

    pub fn from_f32(value: f32) -> Pt {
        Pt::from_f64(value as f64)
    }

    pub fn from_f64(value: f64) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        let milli = (value * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Pt::from_milli_i64(milli)
    }

    pub fn from_mm(mm: f64) -> Pt {
        Pt::from_f64(mm * PT_PER_INCH / MM_PER_INCH)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_num()
    }

    pub fn to_mm(self) -> f64 {
        self.to_f64() * MM_PER_INCH / PT_PER_INCH
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn abs(self) -> Pt {
        if self.to_milli_i64() < 0 { -self } else { self }
    }

    pub fn mul_ratio(self, num: i32, denom: i32) -> Pt {
        if denom == 0 {
            return Pt::ZERO;
        }
        let milli = self.to_milli_i64() as i128;
        let value = div_round_i128(milli.saturating_mul(num as i128), denom as i128);
        Pt::from_milli_i128(value)
    }

    pub fn from_milli_i64(milli: i64) -> Pt {
        Pt::from_milli_i128(milli as i128)
    }

    fn from_milli_i128(milli: i128) -> Pt {
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Pt(I32F32::from_bits(bits))
    }
}

impl std::ops::Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 + rhs.to_milli_i64() as i128)
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 - rhs.to_milli_i64() as i128)
    }
}

impl std::ops::Neg for Pt {
    type Output = Pt;
    fn neg(self) -> Pt {
        Pt::from_milli_i128(-(self.to_milli_i64() as i128))
    }
}

fn div_round_i128(num: i128, den: i128) -> i128 {
    if den == 0 {
        return 0;
    }
    let den_abs = den.abs();
    if num >= 0 {
        (num + (den_abs / 2)) / den
    } else {
        -(((-num) + (den_abs / 2)) / den)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    /// Japanese postcard (hagaki), 100mm x 148mm.
    pub fn hagaki() -> Self {
        Self::from_mm(100.0, 148.0)
    }

    pub fn from_mm(width_mm: f64, height_mm: f64) -> Self {
        Self {
            width: Pt::from_mm(width_mm),
            height: Pt::from_mm(height_mm),
        }
    }

    pub fn approx_eq(self, other: Size) -> bool {
        (self.width - other.width).abs() <= Pt::from_f32(0.01)
            && (self.height - other.height).abs() <= Pt::from_f32(0.01)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hagaki_is_postcard_in_points() {
        let size = Size::hagaki();
        assert_eq!(size.width.to_milli_i64(), 283_465);
        assert_eq!(size.height.to_milli_i64(), 419_528);
    }

    #[test]
    fn mm_round_trips_through_points() {
        let pt = Pt::from_mm(44.8);
        assert!((pt.to_mm() - 44.8).abs() < 0.001);
    }

    #[test]
    fn non_finite_collapses_to_zero() {
        assert_eq!(Pt::from_f64(f64::NAN), Pt::ZERO);
        assert_eq!(Pt::from_f64(f64::INFINITY), Pt::ZERO);
    }

    #[test]
    fn mul_ratio_rounds_half_away_from_zero() {
        let pt = Pt::from_f32(12.0);
        assert_eq!(pt.mul_ratio(500, 1000).to_milli_i64(), 6_000);
        assert_eq!(pt.mul_ratio(1, 0), Pt::ZERO);
    }
}
