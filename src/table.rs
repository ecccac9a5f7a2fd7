use std::{collections::HashMap, fs, io, path::Path};

use candle_core::{DType, Tensor};

use crate::{
    device::DEVICE,
    error::{PricingError, Result},
    state::{ActionIndex, StateIndex},
};

const TABLE_TENSOR: &str = "q_table";
const LEVELS_TENSOR: &str = "discount_levels";

/// Dense `states x actions` matrix of learned values, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTable {
    states: usize,
    actions: usize,
    values: Vec<f64>,
}

impl ValueTable {
    /// Zero-initialised table.
    pub fn new(states: usize, actions: usize) -> Result<Self> {
        Self::from_vec(states, actions, vec![0.0; states * actions])
    }

    pub fn from_vec(states: usize, actions: usize, values: Vec<f64>) -> Result<Self> {
        if states == 0 {
            return Err(PricingError::EmptyCatalog);
        }
        if actions == 0 {
            return Err(PricingError::Config(
                "value table needs at least one action".into(),
            ));
        }
        if values.len() != states * actions {
            return Err(PricingError::Config(format!(
                "{} values cannot fill a {states}x{actions} table",
                values.len()
            )));
        }
        Ok(Self {
            states,
            actions,
            values,
        })
    }

    pub fn states(&self) -> usize {
        self.states
    }

    pub fn actions(&self) -> usize {
        self.actions
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.states, self.actions)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn offset(&self, state: StateIndex, action: ActionIndex) -> Result<usize> {
        if state >= self.states || action >= self.actions {
            return Err(PricingError::IndexOutOfRange {
                state,
                action,
                states: self.states,
                actions: self.actions,
            });
        }
        Ok(state * self.actions + action)
    }

    pub fn get(&self, state: StateIndex, action: ActionIndex) -> Result<f64> {
        let offset = self.offset(state, action)?;
        Ok(self.values[offset])
    }

    pub fn set(&mut self, state: StateIndex, action: ActionIndex, value: f64) -> Result<()> {
        let offset = self.offset(state, action)?;
        self.values[offset] = value;
        Ok(())
    }

    pub fn row(&self, state: StateIndex) -> Result<&[f64]> {
        let start = self.offset(state, 0)?;
        Ok(&self.values[start..start + self.actions])
    }

    /// Argmax over the actions of `state`; ties go to the lowest action index.
    pub fn best_action(&self, state: StateIndex) -> Result<ActionIndex> {
        let row = self.row(state)?;
        let mut best = 0;
        for (action, value) in row.iter().enumerate().skip(1) {
            if *value > row[best] {
                best = action;
            }
        }
        Ok(best)
    }

    /// Value of the greedy action in `state`.
    pub fn max_value(&self, state: StateIndex) -> Result<f64> {
        let action = self.best_action(state)?;
        self.get(state, action)
    }

    /// Writes the table and the discount levels it was trained with as a
    /// safetensors file. The file is written next to `path` and renamed into
    /// place, so a reader never sees a half-written artifact.
    pub fn save<P: AsRef<Path>>(&self, path: P, discount_levels: &[f64]) -> Result<()> {
        let path = path.as_ref();
        if discount_levels.len() != self.actions {
            return Err(PricingError::Config(format!(
                "{} discount levels given for a table with {} actions",
                discount_levels.len(),
                self.actions
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let table = Tensor::from_vec(self.values.clone(), (self.states, self.actions), &DEVICE)?;
        let levels = Tensor::from_vec(discount_levels.to_vec(), self.actions, &DEVICE)?;
        let mut tensors = HashMap::new();
        tensors.insert(TABLE_TENSOR.to_string(), table);
        tensors.insert(LEVELS_TENSOR.to_string(), levels);

        let staging = path.with_extension("safetensors.partial");
        candle_core::safetensors::save(&tensors, &staging)?;
        fs::rename(&staging, path)?;
        tracing::info!(
            path = %path.display(),
            states = self.states,
            actions = self.actions,
            "saved value table"
        );
        Ok(())
    }

    /// Reads a table and its discount levels back exactly as saved.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<f64>)> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PricingError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no value table at {}", path.display()),
            )));
        }
        let mut tensors = candle_core::safetensors::load(path, &DEVICE)?;
        let table = take_f64(&mut tensors, TABLE_TENSOR)?;
        let levels = take_f64(&mut tensors, LEVELS_TENSOR)?;

        let (states, actions) = table.dims2()?;
        let values = table.flatten_all()?.to_vec1::<f64>()?;
        let levels = levels.to_vec1::<f64>()?;
        if levels.len() != actions {
            return Err(PricingError::ShapeMismatch {
                expected: (states, levels.len()),
                found: (states, actions),
            });
        }
        Ok((Self::from_vec(states, actions, values)?, levels))
    }

    /// Loads a table for serving and refuses anything that does not match the
    /// catalog size and the configured discount levels.
    pub fn load_expected<P: AsRef<Path>>(
        path: P,
        states: usize,
        discount_levels: &[f64],
    ) -> Result<Self> {
        let (table, levels) = Self::load(path)?;
        let expected = (states, discount_levels.len());
        if table.shape() != expected {
            return Err(PricingError::ShapeMismatch {
                expected,
                found: table.shape(),
            });
        }
        if levels != discount_levels {
            return Err(PricingError::DiscountLevelsMismatch {
                expected: discount_levels.to_vec(),
                found: levels,
            });
        }
        Ok(table)
    }
}

fn take_f64(tensors: &mut HashMap<String, Tensor>, name: &str) -> Result<Tensor> {
    let tensor = tensors
        .remove(name)
        .ok_or_else(|| PricingError::Config(format!("model artifact has no `{name}` tensor")))?;
    if tensor.dtype() != DType::F64 {
        return Err(PricingError::Config(format!(
            "`{name}` is stored as {:?}, expected f64",
            tensor.dtype()
        )));
    }
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_returns_the_same_value() {
        let mut table = ValueTable::new(4, 3).expect("table");
        for state in 0..4 {
            for action in 0..3 {
                let value = state as f64 * 10.0 - action as f64 / 3.0;
                table.set(state, action, value).expect("set");
                assert_eq!(table.get(state, action).expect("get"), value);
            }
        }
    }

    #[test]
    fn starts_at_zero() {
        let table = ValueTable::new(2, 7).expect("table");
        assert!(table.values().iter().all(|v| *v == 0.0));
        assert_eq!(table.row(1).expect("row"), &[0.0; 7]);
    }

    #[test]
    fn ties_break_to_the_lowest_action() {
        let mut table = ValueTable::new(2, 4).expect("table");
        assert_eq!(table.best_action(0).expect("best"), 0);

        table.set(1, 1, 2.0).expect("set");
        table.set(1, 3, 2.0).expect("set");
        assert_eq!(table.best_action(1).expect("best"), 1);
        assert_eq!(table.max_value(1).expect("max"), 2.0);
    }

    #[test]
    fn best_action_handles_negative_rows() {
        let table = ValueTable::from_vec(1, 3, vec![-3.0, -1.0, -2.0]).expect("table");
        assert_eq!(table.best_action(0).expect("best"), 1);
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut table = ValueTable::new(2, 2).expect("table");
        assert!(matches!(
            table.get(2, 0),
            Err(PricingError::IndexOutOfRange { state: 2, .. })
        ));
        assert!(matches!(
            table.set(0, 2, 1.0),
            Err(PricingError::IndexOutOfRange { action: 2, .. })
        ));
        assert!(table.row(5).is_err());
        assert!(table.best_action(2).is_err());
    }

    #[test]
    fn rejects_degenerate_shapes() {
        assert!(matches!(
            ValueTable::new(0, 3),
            Err(PricingError::EmptyCatalog)
        ));
        assert!(ValueTable::new(3, 0).is_err());
        assert!(ValueTable::from_vec(2, 2, vec![0.0; 3]).is_err());
    }

    #[test]
    fn save_and_load_reproduce_every_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("models").join("q_table.safetensors");
        let values: Vec<f64> = (0..12).map(|i| (i as f64).sqrt() * -1.5 + 0.1).collect();
        let table = ValueTable::from_vec(4, 3, values).expect("table");
        let levels = [0.0, 12.5, 30.0];

        table.save(&path, &levels).expect("save");
        let (loaded, loaded_levels) = ValueTable::load(&path).expect("load");

        assert_eq!(loaded, table);
        assert_eq!(loaded_levels, levels);
        assert!(!path.with_extension("safetensors.partial").exists());
    }

    #[test]
    fn load_expected_rejects_shape_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("q.safetensors");
        let levels = [0.0, 10.0];
        ValueTable::new(3, 2)
            .expect("table")
            .save(&path, &levels)
            .expect("save");

        let err = ValueTable::load_expected(&path, 4, &levels).unwrap_err();
        assert!(matches!(
            err,
            PricingError::ShapeMismatch {
                expected: (4, 2),
                found: (3, 2)
            }
        ));

        let err = ValueTable::load_expected(&path, 3, &[0.0, 5.0, 10.0]).unwrap_err();
        assert!(matches!(err, PricingError::ShapeMismatch { .. }));

        let err = ValueTable::load_expected(&path, 3, &[0.0, 20.0]).unwrap_err();
        assert!(matches!(err, PricingError::DiscountLevelsMismatch { .. }));

        assert!(ValueTable::load_expected(&path, 3, &levels).is_ok());
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let err = ValueTable::load("/nonexistent/q.safetensors").unwrap_err();
        assert!(matches!(err, PricingError::Io(e) if e.kind() == io::ErrorKind::NotFound));
    }
}
