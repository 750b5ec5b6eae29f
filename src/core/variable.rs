//! Variables of the trajectory graph and their values.
//!
//! Every variable is a Euclidean vector (a configuration or a velocity), so the
//! retraction used by the optimizers is plain addition.

use std::collections::BTreeMap;
use std::fmt;

use faer::Mat;
use nalgebra::DVector;

/// Key of one variable in a [`Values`] collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableId(pub usize);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Current estimate of every variable, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    entries: BTreeMap<VariableId, DVector<f64>>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a variable, returning the previous value.
    pub fn insert(&mut self, key: VariableId, value: DVector<f64>) -> Option<DVector<f64>> {
        self.entries.insert(key, value)
    }

    pub fn get(&self, key: VariableId) -> Option<&DVector<f64>> {
        self.entries.get(&key)
    }

    pub fn get_mut(&mut self, key: VariableId) -> Option<&mut DVector<f64>> {
        self.entries.get_mut(&key)
    }

    pub fn remove(&mut self, key: VariableId) -> Option<DVector<f64>> {
        self.entries.remove(&key)
    }

    pub fn contains(&self, key: VariableId) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = VariableId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VariableId, &DVector<f64>)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Euclidean norm of all variables stacked together
    pub fn norm(&self) -> f64 {
        self.entries
            .values()
            .map(|v| v.norm_squared())
            .sum::<f64>()
            .sqrt()
    }

    /// `x + dx` for the variables of `layout`; other variables are copied unchanged.
    pub fn apply_step(&self, layout: &VariableLayout, step: &Mat<f64>) -> Values {
        let mut updated = self.clone();
        for (key, start, dim) in layout.iter() {
            if let Some(value) = updated.entries.get_mut(&key) {
                for i in 0..dim {
                    value[i] += step[(start + i, 0)];
                }
            }
        }
        updated
    }
}

impl FromIterator<(VariableId, DVector<f64>)> for Values {
    fn from_iter<T: IntoIterator<Item = (VariableId, DVector<f64>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Column range of every free variable in the stacked Jacobian.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableLayout {
    columns: BTreeMap<VariableId, (usize, usize)>,
    total_dimension: usize,
}

impl VariableLayout {
    /// Lay variables out in key order.
    pub fn from_dimensions(dims: impl IntoIterator<Item = (VariableId, usize)>) -> Self {
        let mut columns: BTreeMap<VariableId, (usize, usize)> =
            dims.into_iter().map(|(key, dim)| (key, (0, dim))).collect();
        let mut total_dimension = 0;
        for entry in columns.values_mut() {
            entry.0 = total_dimension;
            total_dimension += entry.1;
        }
        Self {
            columns,
            total_dimension,
        }
    }

    /// First column and width of a variable, `None` if it is fixed or unused
    pub fn columns_of(&self, key: VariableId) -> Option<(usize, usize)> {
        self.columns.get(&key).copied()
    }

    pub fn total_dimension(&self) -> usize {
        self.total_dimension
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// `(key, first column, width)` in column order
    pub fn iter(&self) -> impl Iterator<Item = (VariableId, usize, usize)> + '_ {
        self.columns.iter().map(|(k, (s, d))| (*k, *s, *d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_basic_operations() {
        let mut values = Values::new();
        assert!(values.is_empty());
        values.insert(VariableId(3), DVector::from_vec(vec![1.0, 2.0]));
        values.insert(VariableId(1), DVector::from_vec(vec![3.0]));
        assert_eq!(values.len(), 2);
        assert!(values.contains(VariableId(1)));
        assert_eq!(values.keys().collect::<Vec<_>>(), vec![VariableId(1), VariableId(3)]);
        assert!((values.norm() - 14.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(values.remove(VariableId(1)).map(|v| v[0]), Some(3.0));
        assert!(values.get(VariableId(1)).is_none());
    }

    #[test]
    fn test_layout_is_key_ordered() {
        let layout = VariableLayout::from_dimensions([(VariableId(5), 2), (VariableId(1), 3)]);
        assert_eq!(layout.total_dimension(), 5);
        assert_eq!(layout.columns_of(VariableId(1)), Some((0, 3)));
        assert_eq!(layout.columns_of(VariableId(5)), Some((3, 2)));
        assert_eq!(layout.columns_of(VariableId(2)), None);
    }

    #[test]
    fn test_apply_step_skips_variables_outside_layout() {
        let values: Values = [
            (VariableId(0), DVector::from_vec(vec![1.0, 1.0])),
            (VariableId(1), DVector::from_vec(vec![2.0, 2.0])),
        ]
        .into_iter()
        .collect();
        let layout = VariableLayout::from_dimensions([(VariableId(1), 2)]);
        let mut step = Mat::zeros(2, 1);
        step[(0, 0)] = 0.5;
        step[(1, 0)] = -1.0;

        let updated = values.apply_step(&layout, &step);
        assert_eq!(updated.get(VariableId(0)), values.get(VariableId(0)));
        assert_eq!(
            updated.get(VariableId(1)),
            Some(&DVector::from_vec(vec![2.5, 1.0]))
        );
    }

    #[test]
    fn test_variable_id_display() {
        assert_eq!(VariableId(7).to_string(), "x7");
    }
}
