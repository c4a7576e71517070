/// Space implementations.

pub mod space;

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use space::Space;

/// A simple Box-like space with element type `T` and fixed compile-time length `N`.
/// Uses per-dimension inclusive lower/upper bounds for validation and sampling.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxSpace<T: Copy + PartialOrd, const N: usize> {
    low: [T; N],
    high: [T; N],
}

impl<T: Copy + PartialOrd, const N: usize> BoxSpace<T, N> {
    pub fn new(low: [T; N], high: [T; N]) -> Self {
        for i in 0..N {
            assert!(low[i] <= high[i], "low[{i}] > high[{i}]");
        }
        Self { low, high }
    }

    pub fn low(&self) -> &[T; N] { &self.low }
    pub fn high(&self) -> &[T; N] { &self.high }

    /// Clamp every dimension of `elem` into the box.
    pub fn clip(&self, elem: [T; N]) -> [T; N] {
        let mut out = elem;
        for i in 0..N {
            if out[i] < self.low[i] { out[i] = self.low[i]; }
            if out[i] > self.high[i] { out[i] = self.high[i]; }
        }
        out
    }
}

impl<T, const N: usize> Space for BoxSpace<T, N>
where
    T: Copy + PartialOrd + rand::distributions::uniform::SampleUniform,
{
    type Element = [T; N];

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::Element {
        let mut arr = self.low;
        for i in 0..N {
            let dist = Uniform::new_inclusive(self.low[i], self.high[i]);
            arr[i] = dist.sample(rng);
        }
        arr
    }

    fn contains(&self, elem: &Self::Element) -> bool {
        (0..N).all(|i| self.low[i] <= elem[i] && elem[i] <= self.high[i])
    }
}

/// Runtime description of an `f32` box, the form in which workers advertise
/// their observation and action spaces to the orchestrator.
///
/// JSON has no infinities, so unbounded dimensions travel as `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxBounds {
    #[serde(with = "lower")]
    pub low: Vec<f32>,
    #[serde(with = "upper")]
    pub high: Vec<f32>,
}

fn serialize_finite<S: Serializer>(values: &[f32], s: S) -> std::result::Result<S::Ok, S::Error> {
    let opt: Vec<Option<f32>> = values.iter().map(|v| v.is_finite().then_some(*v)).collect();
    opt.serialize(s)
}

fn deserialize_or<'de, D: Deserializer<'de>>(d: D, missing: f32) -> std::result::Result<Vec<f32>, D::Error> {
    let opt = Vec::<Option<f32>>::deserialize(d)?;
    Ok(opt.into_iter().map(|v| v.unwrap_or(missing)).collect())
}

mod lower {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f32], s: S) -> Result<S::Ok, S::Error> {
        super::serialize_finite(values, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f32>, D::Error> {
        super::deserialize_or(d, f32::NEG_INFINITY)
    }
}

mod upper {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f32], s: S) -> Result<S::Ok, S::Error> {
        super::serialize_finite(values, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f32>, D::Error> {
        super::deserialize_or(d, f32::INFINITY)
    }
}

impl BoxBounds {
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Self {
        assert_eq!(low.len(), high.len(), "low and high must have the same length");
        Self { low, high }
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize { self.low.len() }

    /// Whether every dimension has finite bounds.
    pub fn is_bounded(&self) -> bool {
        self.low.iter().chain(self.high.iter()).all(|v| v.is_finite())
    }
}

impl<const N: usize> From<&BoxSpace<f32, N>> for BoxBounds {
    fn from(space: &BoxSpace<f32, N>) -> Self {
        Self { low: space.low().to_vec(), high: space.high().to_vec() }
    }
}

impl Space for BoxBounds {
    type Element = Vec<f32>;

    /// Panics if any dimension is unbounded.
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::Element {
        assert!(self.is_bounded(), "cannot sample from an unbounded box");
        self.low
            .iter()
            .zip(self.high.iter())
            .map(|(&lo, &hi)| Uniform::new_inclusive(lo, hi).sample(rng))
            .collect()
    }

    fn contains(&self, elem: &Self::Element) -> bool {
        elem.len() == self.dim()
            && elem
                .iter()
                .zip(self.low.iter().zip(self.high.iter()))
                .all(|(&v, (&lo, &hi))| lo <= v && v <= hi)
    }
}

/// Environments whose observations and actions are flat `f32` boxes.
/// Worker processes report these bounds to the orchestrator at startup.
pub trait HasSpaces {
    fn observation_space(&self) -> BoxBounds;
    fn action_space(&self) -> BoxBounds;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn box_space_clip_and_contains() {
        let b = BoxSpace::new([-1.0f32], [1.0]);
        assert_eq!(b.clip([3.0]), [1.0]);
        assert_eq!(b.clip([-2.5]), [-1.0]);
        assert!(b.contains(&[0.25]));
        assert!(!b.contains(&[1.5]));
    }

    #[test]
    fn bounds_from_box_space() {
        let b = BoxSpace::new([0.0f32, -1.0], [1.0, 1.0]);
        let bounds = BoxBounds::from(&b);
        assert_eq!(bounds.dim(), 2);
        assert!(bounds.is_bounded());
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let v = bounds.sample(&mut rng);
            assert!(bounds.contains(&v));
        }
        assert!(!bounds.contains(&vec![0.5]));
    }

    #[test]
    fn unbounded_box_is_reported() {
        let bounds = BoxBounds::new(vec![f32::NEG_INFINITY; 3], vec![f32::INFINITY; 3]);
        assert!(!bounds.is_bounded());
        assert!(bounds.contains(&vec![1e9, -1e9, 0.0]));
    }

    #[test]
    fn unbounded_box_survives_json() {
        let bounds = BoxBounds::new(vec![f32::NEG_INFINITY, -1.0], vec![f32::INFINITY, 1.0]);
        let text = serde_json::to_string(&bounds).unwrap();
        assert_eq!(text, r#"{"low":[null,-1.0],"high":[null,1.0]}"#);
        let back: BoxBounds = serde_json::from_str(&text).unwrap();
        assert_eq!(back, bounds);
    }
}
