//! Pure functions that fold remote snapshots into UI-facing state.
//!
//! Nothing in this module performs I/O.  The dispatch engine feeds it wire
//! records plus the locally cached inputs and publishes whatever comes out.
//!
//! # Input-source resolution (for beginners)
//!
//! Many monitors cannot report their current input over DDC/CI, so the
//! service often leaves `input.current` empty even though switching works.
//! The client remembers the last input it saw or selected per display and
//! falls back to it:
//!
//! ```text
//!  remote current present?  ── yes ──▶ use it (and persist it to the cache)
//!          │ no
//!  input supported?         ── no  ──▶ no current input, no available list
//!          │ yes
//!  cached value present?    ── yes ──▶ use it, flag `input_from_cache`
//!          │ no
//!          ▼
//!     no current input
//! ```

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::domain::display::{Capabilities, Display, DisplayId, InputSource};
use crate::protocol::messages::{DisplayInputStatus, DisplayStatus};

/// Outcome of [`resolve_input`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedInput {
    pub current: Option<InputSource>,
    pub available: Vec<InputSource>,
    pub from_cache: bool,
}

/// Resolves the effective current input and the available list.
pub fn resolve_input(remote: &DisplayInputStatus, cached: Option<&InputSource>) -> ResolvedInput {
    if !remote.supported {
        return ResolvedInput::default();
    }

    let remote_current = remote.current.as_ref().and_then(|c| {
        let input = InputSource::from_wire(c.code, &c.name);
        if input.is_none() {
            debug!(code = c.code, "ignoring out-of-range current input code");
        }
        input
    });
    let (current, from_cache) = match remote_current {
        Some(current) => (Some(current), false),
        None => (cached.cloned(), cached.is_some()),
    };

    let mut seen = HashSet::new();
    let mut available = Vec::new();
    let listed = remote
        .available
        .iter()
        .filter_map(|i| InputSource::from_wire(i.code, &i.name));
    for input in current.iter().cloned().chain(listed) {
        if seen.insert(input.code) {
            available.push(input);
        }
    }

    ResolvedInput {
        current,
        available,
        from_cache,
    }
}

/// Clamps a wire percentage into 0–100.
pub fn clamp_percent(value: i32) -> u8 {
    // Clamped into 0..=100, so the cast cannot truncate.
    value.clamp(0, 100) as u8
}

/// Converts one wire record into a UI display using the cached input, if any.
pub fn to_display(status: &DisplayStatus, cached: Option<&InputSource>) -> Display {
    let resolved = resolve_input(&status.input, cached);
    let name = if status.friendly_name.trim().is_empty() {
        status.name.clone()
    } else {
        status.friendly_name.clone()
    };

    Display {
        id: status.id,
        name,
        brightness: clamp_percent(status.brightness),
        volume: status.volume.map(clamp_percent),
        power_on: !status.power_state.trim().eq_ignore_ascii_case("off"),
        capabilities: Capabilities {
            brightness: status.capabilities.brightness,
            volume: status.capabilities.volume,
            power: status.capabilities.power,
            input: status.input.supported,
        },
        current_input: resolved.current,
        available_inputs: resolved.available,
        input_from_cache: resolved.from_cache,
        is_virtual: status.is_virtual,
        busy: false,
    }
}

/// Folds a display list, dropping dummy displays.
pub fn fold_displays(
    statuses: &[DisplayStatus],
    cache: &HashMap<DisplayId, InputSource>,
) -> Vec<Display> {
    statuses
        .iter()
        .filter(|s| {
            if s.is_dummy {
                debug!(display_id = s.id, "skipping dummy display");
            }
            !s.is_dummy
        })
        .map(|s| to_display(s, cache.get(&s.id)))
        .collect()
}

/// Remote-reported inputs that should be written to the cache.
///
/// Only displays that support input selection and report a valid current
/// input contribute.  Dummy displays are skipped.
pub fn inputs_to_persist(statuses: &[DisplayStatus]) -> Vec<(DisplayId, InputSource)> {
    statuses
        .iter()
        .filter(|s| !s.is_dummy && s.input.supported)
        .filter_map(|s| {
            let current = s.input.current.as_ref()?;
            InputSource::from_wire(current.code, &current.name).map(|input| (s.id, input))
        })
        .collect()
}

/// Replaces displays in `existing` whose id appears in `updates`, keeping the
/// order of `existing` and appending displays it did not know yet.
pub fn merge_by_id(existing: &[Display], updates: Vec<Display>) -> Vec<Display> {
    let mut by_id: HashMap<DisplayId, Display> = updates.into_iter().map(|d| (d.id, d)).collect();
    let mut merged: Vec<Display> = existing
        .iter()
        .map(|d| by_id.remove(&d.id).unwrap_or_else(|| d.clone()))
        .collect();
    let mut added: Vec<Display> = by_id.into_values().collect();
    added.sort_by_key(|d| d.id);
    merged.extend(added);
    merged
}

// ── Aggregates ────────────────────────────────────────────────────────────────

fn rounded_mean(values: &[u32]) -> Option<u8> {
    if values.is_empty() {
        return None;
    }
    let sum: u32 = values.iter().sum();
    let count = values.len() as u32;
    let mean = (sum + count / 2) / count;
    Some(mean.min(100) as u8)
}

/// Rounded mean brightness over brightness-capable displays, or `fallback`
/// when there are none.
pub fn aggregate_brightness(displays: &[Display], fallback: u8) -> u8 {
    let values: Vec<u32> = displays
        .iter()
        .filter(|d| d.capabilities.brightness)
        .map(|d| u32::from(d.brightness))
        .collect();
    rounded_mean(&values).unwrap_or(fallback)
}

/// Rounded mean volume over volume-capable displays, or `fallback` when
/// there are none.  A capable display without a reported volume counts as 0.
pub fn aggregate_volume(displays: &[Display], fallback: u8) -> u8 {
    let values: Vec<u32> = displays
        .iter()
        .filter(|d| d.capabilities.volume)
        .map(|d| u32::from(d.volume.unwrap_or(0)))
        .collect();
    rounded_mean(&values).unwrap_or(fallback)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{DisplayCapabilities, InputSourceStatus};

    fn wire_input(code: i32, name: &str) -> InputSourceStatus {
        InputSourceStatus {
            code,
            name: name.to_string(),
        }
    }

    fn status(id: i64) -> DisplayStatus {
        DisplayStatus {
            id,
            name: format!("Display {id}"),
            friendly_name: String::new(),
            kind: "other".to_string(),
            is_virtual: false,
            is_dummy: false,
            brightness: 50,
            volume: None,
            power_state: "on".to_string(),
            capabilities: DisplayCapabilities {
                brightness: true,
                volume: false,
                power: true,
            },
            input: DisplayInputStatus::default(),
        }
    }

    #[test]
    fn test_remote_current_wins_over_cache() {
        // Arrange
        let remote = DisplayInputStatus {
            supported: true,
            current: Some(wire_input(17, "HDMI-1")),
            available: vec![wire_input(15, "DP-1"), wire_input(17, "HDMI-1")],
            ..Default::default()
        };
        let cached = InputSource::new(15, "DP-1");

        // Act
        let resolved = resolve_input(&remote, Some(&cached));

        // Assert
        assert_eq!(resolved.current, Some(InputSource::new(17, "HDMI-1")));
        assert!(!resolved.from_cache);
        let codes: Vec<u8> = resolved.available.iter().map(|i| i.code).collect();
        assert_eq!(codes, vec![17, 15]);
    }

    #[test]
    fn test_cache_fills_in_when_remote_current_missing() {
        let remote = DisplayInputStatus {
            supported: true,
            available: vec![wire_input(15, "DP-1")],
            ..Default::default()
        };
        let cached = InputSource::new(17, "HDMI-1");

        let resolved = resolve_input(&remote, Some(&cached));

        assert_eq!(resolved.current, Some(cached));
        assert!(resolved.from_cache);
        assert_eq!(resolved.available.len(), 2);
        assert_eq!(resolved.available[0].code, 17);
    }

    #[test]
    fn test_unsupported_input_yields_nothing_even_with_cache() {
        let remote = DisplayInputStatus {
            supported: false,
            current: Some(wire_input(17, "HDMI-1")),
            available: vec![wire_input(15, "DP-1")],
            ..Default::default()
        };

        let resolved = resolve_input(&remote, Some(&InputSource::new(17, "HDMI-1")));

        assert_eq!(resolved, ResolvedInput::default());
    }

    #[test]
    fn test_out_of_range_codes_are_dropped() {
        let remote = DisplayInputStatus {
            supported: true,
            current: Some(wire_input(300, "bogus")),
            available: vec![wire_input(-1, "neg"), wire_input(3, "VGA")],
            ..Default::default()
        };

        let resolved = resolve_input(&remote, None);

        assert_eq!(resolved.current, None);
        assert_eq!(resolved.available, vec![InputSource::new(3, "VGA")]);
    }

    #[test]
    fn test_to_display_prefers_friendly_name_and_clamps_values() {
        // Arrange
        let mut s = status(4);
        s.friendly_name = "Studio".to_string();
        s.brightness = 140;
        s.volume = Some(-5);
        s.power_state = "OFF".to_string();

        // Act
        let display = to_display(&s, None);

        // Assert
        assert_eq!(display.name, "Studio");
        assert_eq!(display.brightness, 100);
        assert_eq!(display.volume, Some(0));
        assert!(!display.power_on);
        assert!(!display.busy);
    }

    #[test]
    fn test_unknown_power_state_counts_as_on() {
        let mut s = status(1);
        s.power_state = "standby".to_string();
        assert!(to_display(&s, None).power_on);
    }

    #[test]
    fn test_fold_excludes_dummy_displays() {
        let mut dummy = status(2);
        dummy.is_dummy = true;

        let displays = fold_displays(&[status(1), dummy, status(3)], &HashMap::new());

        let ids: Vec<i64> = displays.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_inputs_to_persist_only_reports_supported_current_inputs() {
        let mut with_input = status(1);
        with_input.input = DisplayInputStatus {
            supported: true,
            current: Some(wire_input(17, "")),
            ..Default::default()
        };
        let mut unsupported = status(2);
        unsupported.input.current = Some(wire_input(15, "DP-1"));

        let persisted = inputs_to_persist(&[with_input, unsupported, status(3)]);

        assert_eq!(persisted, vec![(1, InputSource::new(17, "UNKNOWN-17"))]);
    }

    #[test]
    fn test_merge_by_id_replaces_known_and_appends_new() {
        let existing = vec![to_display(&status(1), None), to_display(&status(2), None)];
        let mut updated = status(2);
        updated.brightness = 90;

        let merged = merge_by_id(
            &existing,
            vec![to_display(&updated, None), to_display(&status(7), None)],
        );

        let ids: Vec<i64> = merged.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2, 7]);
        assert_eq!(merged[1].brightness, 90);
    }

    #[test]
    fn test_aggregates_round_and_fall_back() {
        // Arrange
        let mut a = to_display(&status(1), None);
        a.brightness = 50;
        let mut b = to_display(&status(2), None);
        b.brightness = 51;
        let mut incapable = to_display(&status(3), None);
        incapable.capabilities.brightness = false;
        incapable.brightness = 0;

        // Act / Assert
        assert_eq!(aggregate_brightness(&[a.clone(), b, incapable], 10), 51);
        assert_eq!(aggregate_volume(&[a], 42), 42);
        assert_eq!(aggregate_brightness(&[], 33), 33);
    }
}
