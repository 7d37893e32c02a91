//! Per-unit debounce with in-flight suppression.
//!
//! ```text
//!            touch              deadline passed          finish
//!   Idle ───────────► Pending ──────────────► Building ─────────► Idle
//!                     │    ▲                    │   touch + due
//!                     └────┘ touch (reset)      └──► FollowUp policy: re-armed on finish
//!                                                    Drop policy:     discarded
//! ```
//!
//! Pure timing: callers pass `now`, nothing here sleeps.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::{hash::Hash, time::Duration};
use tokio::time::Instant;

/// What happens when a unit's timer fires while it is still building.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusyPolicy {
    /// Remember at most one follow-up build, started after the current one.
    #[default]
    FollowUp,
    /// Discard the fire.
    Drop,
}

#[derive(Debug, Default)]
struct UnitState {
    timer: Option<Instant>,
    building: bool,
    follow_up: bool,
}

impl UnitState {
    const fn is_idle(&self) -> bool {
        self.timer.is_none() && !self.building && !self.follow_up
    }
}

#[derive(Debug)]
pub struct ChangeCoalescer<K> {
    window: Duration,
    policy: BusyPolicy,
    units: FxHashMap<K, UnitState>,
}

impl<K: Eq + Hash + Clone> ChangeCoalescer<K> {
    pub fn new(window: Duration, policy: BusyPolicy) -> Self {
        Self {
            window,
            policy,
            units: FxHashMap::default(),
        }
    }

    /// Arm or reset the unit's timer to `now + window`.
    pub fn touch(&mut self, unit: K, now: Instant) {
        self.units.entry(unit).or_default().timer = Some(now + self.window);
    }

    /// Earliest armed timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.units.values().filter_map(|s| s.timer).min()
    }

    /// Units whose timer expired and which may start building now.
    ///
    /// Returned units are marked building, in deadline order.
    pub fn take_due(&mut self, now: Instant) -> Vec<K> {
        let mut due: Vec<(Instant, K)> = Vec::new();

        for (unit, state) in &mut self.units {
            let Some(deadline) = state.timer else {
                continue;
            };
            if deadline > now {
                continue;
            }
            state.timer = None;

            if state.building {
                if self.policy == BusyPolicy::FollowUp {
                    state.follow_up = true;
                }
                continue;
            }

            state.building = true;
            due.push((deadline, unit.clone()));
        }

        self.units.retain(|_, state| !state.is_idle());
        due.sort_by_key(|(deadline, _)| *deadline);
        due.into_iter().map(|(_, unit)| unit).collect()
    }

    /// The unit's build completed (successfully or not).
    ///
    /// A recorded follow-up goes through the normal debounce path again.
    pub fn finish(&mut self, unit: &K, now: Instant) {
        let Some(state) = self.units.get_mut(unit) else {
            return;
        };
        state.building = false;

        if std::mem::take(&mut state.follow_up) {
            state.timer = Some(now + self.window);
        }
        if state.is_idle() {
            self.units.remove(unit);
        }
    }

    pub fn is_building(&self, unit: &K) -> bool {
        self.units.get(unit).is_some_and(|s| s.building)
    }

    /// Whether any unit is pending or building.
    pub fn is_busy(&self) -> bool {
        !self.units.is_empty()
    }
}
