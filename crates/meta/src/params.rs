//! Ordered, name-keyed parameter maps for meta-modules.
//!
//! candle's backprop only keeps gradients for leaf variables. A parameter
//! produced by a gradient update is not a leaf, so each [`MetaParameter`]
//! carries an anchor [`Var`]: leaves are their own anchor, derived values are
//! stored as `value + anchor` with a zero anchor. The gradient recorded for
//! the anchor equals the gradient with respect to the value, which is what
//! lets an inner loop differentiate through several updates.

use crate::error::Result;
use candle_core::{Device, Tensor, Var};

/// A trainable tensor together with the variable its gradient is read from.
#[derive(Debug, Clone)]
pub struct MetaParameter {
    value: Tensor,
    anchor: Var,
}

impl MetaParameter {
    /// Wrap a leaf variable.
    pub fn from_var(var: Var) -> Self {
        Self {
            value: var.as_tensor().clone(),
            anchor: var,
        }
    }

    /// Wrap an arbitrary tensor, keeping its graph and attaching a zero anchor.
    pub fn from_tensor(value: Tensor) -> Result<Self> {
        let anchor = Var::zeros(value.shape(), value.dtype(), value.device())?;
        let value = value.add(anchor.as_tensor())?;
        Ok(Self { value, anchor })
    }

    /// Tensor used by forward passes.
    pub fn value(&self) -> &Tensor {
        &self.value
    }

    /// Variable whose gradient is the gradient with respect to [`Self::value`].
    pub fn anchor(&self) -> &Var {
        &self.anchor
    }

    /// Whether the value is the anchor variable itself.
    pub fn is_leaf(&self) -> bool {
        self.value.id() == self.anchor.as_tensor().id()
    }

    /// Fresh leaf holding a copy of the current value, cut from any graph.
    pub fn detach(&self) -> Result<Self> {
        let var = Var::from_tensor(&self.value.detach())?;
        Ok(Self::from_var(var))
    }

    /// Relocate onto `device`. Leaves stay leaves; derived values are re-anchored.
    pub fn to_device(&self, device: &Device) -> Result<Self> {
        if self.value.device().same_device(device) {
            return Ok(self.clone());
        }
        let moved = self.value.to_device(device)?;
        if self.is_leaf() {
            Ok(Self::from_var(Var::from_tensor(&moved)?))
        } else {
            Self::from_tensor(moved)
        }
    }
}

/// Insertion-ordered map from parameter name to [`MetaParameter`].
#[derive(Debug, Clone, Default)]
pub struct MetaParams {
    entries: Vec<(String, MetaParameter)>,
}

impl MetaParams {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter, replacing an existing entry in place.
    pub fn insert(&mut self, name: impl Into<String>, param: MetaParameter) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = param,
            None => self.entries.push((name, param)),
        }
    }

    /// Insert a leaf variable.
    pub fn insert_var(&mut self, name: impl Into<String>, var: Var) {
        self.insert(name, MetaParameter::from_var(var));
    }

    /// Look up a parameter.
    pub fn get(&self, name: &str) -> Option<&MetaParameter> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, param)| param)
    }

    /// Look up the value tensor of a parameter.
    pub fn tensor(&self, name: &str) -> Option<&Tensor> {
        self.get(name).map(MetaParameter::value)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaParameter)> {
        self.entries
            .iter()
            .map(|(name, param)| (name.as_str(), param))
    }

    /// Parameter names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries under `prefix.`, with the prefix stripped.
    ///
    /// This is the view a child module gets of its parent's parameters, e.g.
    /// `layers.0.weight` becomes `weight` for `subdict("layers.0")`.
    pub fn subdict(&self, prefix: &str) -> MetaParams {
        let dotted = format!("{}.", prefix);
        let entries = self
            .entries
            .iter()
            .filter_map(|(name, param)| {
                name.strip_prefix(&dotted)
                    .map(|rest| (rest.to_string(), param.clone()))
            })
            .collect();
        MetaParams { entries }
    }

    /// Copy every entry into a fresh leaf variable.
    pub fn detach(&self) -> Result<MetaParams> {
        let entries = self
            .entries
            .iter()
            .map(|(name, param)| Ok((name.clone(), param.detach()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(MetaParams { entries })
    }

    /// Anchor variables in insertion order, e.g. for an outer-loop optimizer.
    pub fn to_vars(&self) -> Vec<Var> {
        self.entries
            .iter()
            .map(|(_, param)| param.anchor().clone())
            .collect()
    }

    /// Total number of scalar elements.
    pub fn elem_count(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, param)| param.value().elem_count())
            .sum()
    }
}

impl FromIterator<(String, MetaParameter)> for MetaParams {
    fn from_iter<I: IntoIterator<Item = (String, MetaParameter)>>(iter: I) -> Self {
        let mut params = MetaParams::new();
        for (name, param) in iter {
            params.insert(name, param);
        }
        params
    }
}

impl<'a> IntoIterator for &'a MetaParams {
    type Item = (&'a str, &'a MetaParameter);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(values: &[f32]) -> MetaParameter {
        MetaParameter::from_var(Var::new(values, &Device::Cpu).unwrap())
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut params = MetaParams::new();
        params.insert("zeta", leaf(&[1.0]));
        params.insert("alpha", leaf(&[2.0]));
        params.insert("mid", leaf(&[3.0]));
        let names: Vec<_> = params.names().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn insert_replaces_existing_entry_in_place() {
        let mut params = MetaParams::new();
        params.insert("a", leaf(&[1.0]));
        params.insert("b", leaf(&[2.0]));
        params.insert("a", leaf(&[5.0]));

        assert_eq!(params.len(), 2);
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["a", "b"]);
        let a = params.tensor("a").unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(a, vec![5.0]);
    }

    #[test]
    fn subdict_strips_prefix() {
        let mut params = MetaParams::new();
        params.insert("layers.0.weight", leaf(&[1.0]));
        params.insert("layers.0.bias", leaf(&[2.0]));
        params.insert("layers.1.weight", leaf(&[3.0]));
        params.insert("layers.10.weight", leaf(&[4.0]));

        let first = params.subdict("layers.0");
        assert_eq!(first.names().collect::<Vec<_>>(), vec!["weight", "bias"]);

        let second = params.subdict("layers.1");
        assert_eq!(second.names().collect::<Vec<_>>(), vec!["weight"]);
        assert!(params.subdict("head").is_empty());
    }

    #[test]
    fn derived_parameter_reports_gradient_on_anchor() {
        let base = Var::new(&[2.0f32], &Device::Cpu).unwrap();
        let derived = base.as_tensor().affine(3.0, 0.0).unwrap();
        let param = MetaParameter::from_tensor(derived).unwrap();
        assert!(!param.is_leaf());

        let loss = param.value().sqr().unwrap().sum_all().unwrap();
        let grads = loss.backward().unwrap();

        // d(v^2)/dv at v = 6
        let anchor_grad = grads.get(param.anchor()).unwrap().to_vec1::<f32>().unwrap();
        assert!((anchor_grad[0] - 12.0).abs() < 1e-5);
        // and the chain back to the base leaf is intact: 12 * 3
        let base_grad = grads.get(&base).unwrap().to_vec1::<f32>().unwrap();
        assert!((base_grad[0] - 36.0).abs() < 1e-5);
    }

    #[test]
    fn detach_produces_independent_leaves() {
        let mut params = MetaParams::new();
        params.insert(
            "w",
            MetaParameter::from_tensor(Tensor::new(&[1.5f32], &Device::Cpu).unwrap()).unwrap(),
        );
        let detached = params.detach().unwrap();
        let param = detached.get("w").unwrap();
        assert!(param.is_leaf());
        assert_eq!(param.value().to_vec1::<f32>().unwrap(), vec![1.5]);
    }

    #[test]
    fn elem_count_sums_all_entries() {
        let mut params = MetaParams::new();
        params.insert("a", leaf(&[1.0, 2.0, 3.0]));
        params.insert("b", leaf(&[4.0]));
        assert_eq!(params.elem_count(), 4);
        assert_eq!(params.to_vars().len(), 2);
    }
}
