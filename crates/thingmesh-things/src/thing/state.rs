//! Band bookkeeping for a single Thing.
//!
//! Everything here runs under the Thing's state lock and never blocks or
//! calls out. The engine decides what to do with the changes returned.

use serde_json::{Map, Value};

use thingmesh_core::timestamp::{self, Timestamp};
use thingmesh_core::vocab::keys;

use crate::events::Band;
use crate::model::Model;
use crate::value::values_equal;

/// Runtime value slots for one attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Slot {
    pub ivalue: Value,
    pub ichanged: bool,
    pub ovalue: Value,
    pub ochanged: bool,
}

impl Slot {
    pub fn value(&self, band: Band) -> &Value {
        match band {
            Band::Istate => &self.ivalue,
            Band::Ostate => &self.ovalue,
        }
    }

    fn store(&mut self, band: Band, value: Value) {
        match band {
            Band::Istate => {
                self.ivalue = value;
                self.ichanged = true;
            }
            Band::Ostate => {
                self.ovalue = value;
                self.ochanged = true;
            }
        }
    }

    fn reset_changed(&mut self, band: Band) {
        match band {
            Band::Istate => self.ichanged = false,
            Band::Ostate => self.ochanged = false,
        }
    }
}

/// Why a batch was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejected {
    /// Timestamp not newer than the band's
    Stale,
    /// Nothing in the batch differs from the band
    Unchanged,
}

/// Mutable per-Thing state.
#[derive(Debug)]
pub(crate) struct ThingState {
    pub slots: Vec<Slot>,
    pub itimestamp: Option<Timestamp>,
    pub otimestamp: Option<Timestamp>,
    /// Pushes scheduled or handed to the bridge and not yet completed
    pub pushes: usize,
    /// Device-coded values waiting for the next scheduled push
    pub pending: Option<Map<String, Value>>,
}

impl ThingState {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![Slot::default(); len],
            itimestamp: None,
            otimestamp: None,
            pushes: 0,
            pending: None,
        }
    }

    pub fn timestamp(&self, band: Band) -> Option<&Timestamp> {
        match band {
            Band::Istate => self.itimestamp.as_ref(),
            Band::Ostate => self.otimestamp.as_ref(),
        }
    }

    fn set_timestamp(&mut self, band: Band, ts: Timestamp) {
        match band {
            Band::Istate => self.itimestamp = Some(ts),
            Band::Ostate => self.otimestamp = Some(ts),
        }
    }

    /// Apply a validated batch to `band` all-or-nothing.
    ///
    /// The staleness check runs once before anything is touched. With
    /// `force`, values equal to the current ones still count as changes.
    /// Returns the changes actually applied.
    pub fn merge(
        &mut self,
        band: Band,
        batch: Vec<(usize, Value)>,
        ts: Option<Timestamp>,
        check_timestamp: bool,
        force: bool,
    ) -> Result<Vec<(usize, Value)>, Rejected> {
        if check_timestamp {
            if let Some(incoming) = &ts {
                if !timestamp::is_newer(self.timestamp(band), incoming) {
                    return Err(Rejected::Stale);
                }
            }
        }

        let changes: Vec<(usize, Value)> = batch
            .into_iter()
            .filter(|(i, value)| force || !values_equal(self.slots[*i].value(band), value))
            .collect();
        if changes.is_empty() {
            return Err(Rejected::Unchanged);
        }

        for slot in &mut self.slots {
            slot.reset_changed(band);
        }
        for (i, value) in &changes {
            self.slots[*i].store(band, value.clone());
        }
        let ts = ts.unwrap_or_else(|| timestamp::advance(self.timestamp(band)));
        self.set_timestamp(band, ts);
        Ok(changes)
    }

    /// Abandon every requested value.
    pub fn clear_ostate(&mut self) {
        for slot in &mut self.slots {
            slot.ovalue = Value::Null;
            slot.ochanged = false;
        }
        self.otimestamp = Some(timestamp::advance(self.otimestamp.as_ref()));
    }

    /// `get` semantics: observed value, else requested value, else null.
    pub fn effective(&self, index: usize) -> Value {
        let slot = &self.slots[index];
        if !slot.ivalue.is_null() {
            slot.ivalue.clone()
        } else {
            slot.ovalue.clone()
        }
    }

    /// Render a value band keyed by attribute code.
    pub fn band(&self, model: &Model, band: Band) -> Map<String, Value> {
        let mut map: Map<String, Value> = model
            .attributes()
            .iter()
            .zip(&self.slots)
            .map(|(attribute, slot)| (attribute.code().to_string(), slot.value(band).clone()))
            .collect();
        map.insert(
            keys::TIMESTAMP.into(),
            self.timestamp(band)
                .map(|ts| Value::String(timestamp::to_iso(ts)))
                .unwrap_or(Value::Null),
        );
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_marks_only_changed() {
        let mut state = ThingState::new(2);
        let changes = state
            .merge(Band::Istate, vec![(0, json!(true))], None, true, false)
            .unwrap();
        assert_eq!(changes, vec![(0, json!(true))]);
        assert!(state.slots[0].ichanged);
        assert!(state.itimestamp.is_some());
        assert!(state.otimestamp.is_none());

        let changes = state
            .merge(Band::Istate, vec![(0, json!(true)), (1, json!(5))], None, true, false)
            .unwrap();
        assert_eq!(changes, vec![(1, json!(5))]);
        assert!(!state.slots[0].ichanged);
        assert!(state.slots[1].ichanged);
    }

    #[test]
    fn test_merge_unchanged_keeps_timestamp() {
        let mut state = ThingState::new(1);
        state.merge(Band::Ostate, vec![(0, json!(1))], None, true, false).unwrap();
        let before = state.otimestamp;
        assert_eq!(
            state.merge(Band::Ostate, vec![(0, json!(1.0))], None, true, false),
            Err(Rejected::Unchanged)
        );
        assert_eq!(state.otimestamp, before);
        assert!(state.merge(Band::Ostate, vec![(0, json!(1))], None, true, true).is_ok());
    }

    #[test]
    fn test_merge_rejects_stale_and_ties() {
        let mut state = ThingState::new(1);
        let ts = timestamp::parse("2020-01-01T00:00:00Z");
        state.merge(Band::Istate, vec![(0, json!(1))], ts, true, false).unwrap();
        assert_eq!(
            state.merge(Band::Istate, vec![(0, json!(2))], ts, true, false),
            Err(Rejected::Stale)
        );
        let older = timestamp::parse("2019-01-01T00:00:00Z");
        assert_eq!(
            state.merge(Band::Istate, vec![(0, json!(2))], older, true, false),
            Err(Rejected::Stale)
        );
        assert_eq!(state.slots[0].ivalue, json!(1));
        assert!(state.merge(Band::Istate, vec![(0, json!(2))], older, false, false).is_ok());
    }

    #[test]
    fn test_clear_and_effective() {
        let mut state = ThingState::new(1);
        state.merge(Band::Ostate, vec![(0, json!("x"))], None, true, false).unwrap();
        assert_eq!(state.effective(0), json!("x"));
        state.merge(Band::Istate, vec![(0, json!("y"))], None, true, false).unwrap();
        assert_eq!(state.effective(0), json!("y"));

        let before = state.otimestamp;
        state.clear_ostate();
        assert_eq!(state.slots[0].ovalue, Value::Null);
        assert!(!state.slots[0].ochanged);
        assert!(state.otimestamp > before);
    }
}
