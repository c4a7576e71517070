use crate::core::Info;
use crate::registry::Observation;
use crate::vector::protocol::StepReply;

/// Results of one batched step, index-aligned with worker construction order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepBatch {
    pub observations: Vec<Observation>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
    pub infos: Vec<Info>,
}

impl StepBatch {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            observations: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            dones: Vec::with_capacity(n),
            infos: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, reply: StepReply) {
        self.observations.push(reply.observation);
        self.rewards.push(reply.reward);
        self.dones.push(reply.done);
        self.infos.push(reply.info);
    }

    pub fn len(&self) -> usize { self.rewards.len() }

    pub fn is_empty(&self) -> bool { self.rewards.is_empty() }

    /// Observations stacked into an `(N, obs_dim)` array.
    #[cfg(feature = "ndarray")]
    pub fn observations_array(&self) -> Result<ndarray::Array2<f32>, ndarray::ShapeError> {
        stack_observations(&self.observations)
    }
}

impl FromIterator<StepReply> for StepBatch {
    fn from_iter<I: IntoIterator<Item = StepReply>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut batch = StepBatch::with_capacity(iter.size_hint().0);
        for reply in iter {
            batch.push(reply);
        }
        batch
    }
}

/// Stack equal-length observations row by row.
#[cfg(feature = "ndarray")]
pub fn stack_observations(observations: &[Observation]) -> Result<ndarray::Array2<f32>, ndarray::ShapeError> {
    let dim = observations.first().map_or(0, Vec::len);
    let flat: Vec<f32> = observations.iter().flatten().copied().collect();
    ndarray::Array2::from_shape_vec((observations.len(), dim), flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InfoValue;

    fn reply(x: f32, done: bool) -> StepReply {
        let mut info = Info::new();
        info.insert("x", InfoValue::from(x));
        StepReply { observation: vec![x, -x], reward: x * 10.0, done, info }
    }

    #[test]
    fn collects_in_order() {
        let batch: StepBatch = vec![reply(1.0, false), reply(2.0, true), reply(3.0, false)].into_iter().collect();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.rewards, vec![10.0, 20.0, 30.0]);
        assert_eq!(batch.dones, vec![false, true, false]);
        assert_eq!(batch.observations[2], vec![3.0, -3.0]);
        assert_eq!(batch.infos[1].get("x").and_then(InfoValue::as_f64), Some(2.0));
    }

    #[test]
    fn empty_batch() {
        let batch = StepBatch::default();
        assert!(batch.is_empty());
    }

    #[cfg(feature = "ndarray")]
    #[test]
    fn stacks_into_rows() {
        let batch: StepBatch = vec![reply(1.0, false), reply(2.0, false)].into_iter().collect();
        let arr = batch.observations_array().unwrap();
        assert_eq!(arr.shape(), &[2, 2]);
        assert_eq!(arr[[1, 1]], -2.0);
        assert!(stack_observations(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
