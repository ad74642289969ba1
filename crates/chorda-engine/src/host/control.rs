use ladspa_sys as ffi;
use serde::Serialize;

use super::{PortInfo, PortKind};
use crate::error::ControlError;

/// Computes the default value a port hint asks for.
///
/// Returns `None` when the hint carries no default.
pub fn default_value(hint: ffi::LADSPA_PortRangeHintDescriptor, lower: f32, upper: f32) -> Option<f32> {
    let logarithmic = ffi::is_hint_logarithmic(hint);
    let blend = |low_weight: f32| {
        if logarithmic {
            (lower.ln() * low_weight + upper.ln() * (1.0 - low_weight)).exp()
        } else {
            lower * low_weight + upper * (1.0 - low_weight)
        }
    };

    match ffi::hint_default(hint) {
        ffi::LADSPA_HINT_DEFAULT_MINIMUM => Some(lower),
        ffi::LADSPA_HINT_DEFAULT_LOW => Some(blend(0.75)),
        ffi::LADSPA_HINT_DEFAULT_MIDDLE => Some(blend(0.5)),
        ffi::LADSPA_HINT_DEFAULT_HIGH => Some(blend(0.25)),
        ffi::LADSPA_HINT_DEFAULT_MAXIMUM => Some(upper),
        ffi::LADSPA_HINT_DEFAULT_0 => Some(0.0),
        ffi::LADSPA_HINT_DEFAULT_1 => Some(1.0),
        ffi::LADSPA_HINT_DEFAULT_100 => Some(100.0),
        ffi::LADSPA_HINT_DEFAULT_440 => Some(440.0),
        _ => None,
    }
}

/// One adjustable parameter of a hosted filter.
///
/// `value` is the cell the plugin reads through its connected control port.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    port: usize,
    name: String,
    value: f32,
    default: Option<f32>,
    lower: f32,
    upper: f32,
    bounded_below: bool,
    bounded_above: bool,
    toggled: bool,
    integer: bool,
    logarithmic: bool,
    output: bool,
}

impl Control {
    /// Builds the control for plugin port `port`. Sample-rate relative bounds
    /// are scaled by `sample_rate` before the default is derived.
    pub fn from_port(port: usize, info: &PortInfo, sample_rate: u32) -> Self {
        let hint = info.hint.descriptor;
        let (mut lower, mut upper) = (info.hint.lower, info.hint.upper);
        if ffi::is_hint_sample_rate(hint) {
            lower *= sample_rate as f32;
            upper *= sample_rate as f32;
        }

        let output = info.kind == Some(PortKind::ControlOutput);
        let default = if output {
            None
        } else {
            default_value(hint, lower, upper)
        };

        Self {
            port,
            name: info.name.clone(),
            value: default.unwrap_or(0.0),
            default,
            lower,
            upper,
            bounded_below: ffi::is_hint_bounded_below(hint),
            bounded_above: ffi::is_hint_bounded_above(hint),
            toggled: ffi::is_hint_toggled(hint),
            integer: ffi::is_hint_integer(hint),
            logarithmic: ffi::is_hint_logarithmic(hint),
            output,
        }
    }

    pub fn port(&self) -> usize {
        self.port
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn default(&self) -> Option<f32> {
        self.default
    }

    pub fn bounds(&self) -> (f32, f32) {
        (self.lower, self.upper)
    }

    pub fn is_toggled(&self) -> bool {
        self.toggled
    }

    pub fn is_integer(&self) -> bool {
        self.integer
    }

    pub fn is_output(&self) -> bool {
        self.output
    }

    /// Writes a new value.
    ///
    /// Toggles coerce any non-zero input to `1`. Everything else is checked
    /// against the declared bounds and rejected, never clamped; integer values
    /// are rounded up first, so the rounded value must fit under the upper
    /// bound. NaN is rejected. Returns the value actually stored.
    pub fn set(&mut self, value: f32) -> Result<f32, ControlError> {
        if self.output {
            return Err(ControlError::ReadOnly(self.name.clone()));
        }

        let stored = if self.toggled {
            if value != 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            if value.is_nan() {
                return Err(ControlError::NotFinite {
                    name: self.name.clone(),
                    value,
                });
            }
            let rounded = if self.integer { value.ceil() } else { value };
            if self.bounded_above && rounded > self.upper {
                return Err(ControlError::AboveBounds {
                    name: self.name.clone(),
                    value,
                    upper: self.upper,
                });
            }
            if self.bounded_below && value < self.lower {
                return Err(ControlError::BelowBounds {
                    name: self.name.clone(),
                    value,
                    lower: self.lower,
                });
            }
            rounded
        };

        self.value = stored;
        Ok(stored)
    }

    pub(crate) fn value_ptr(&mut self) -> *mut f32 {
        &mut self.value
    }
}

/// Serializable description of a control, as reported by filter queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlInfo {
    pub index: usize,
    pub name: String,
    pub value: f32,
    pub has_default: bool,
    pub default_value: Option<f32>,
    pub lower_bound: f32,
    pub upper_bound: f32,
    pub bounded_below: bool,
    pub bounded_above: bool,
    pub toggled: bool,
    pub integer: bool,
    pub logarithmic: bool,
    pub output: bool,
}

impl ControlInfo {
    pub fn new(index: usize, control: &Control) -> Self {
        Self {
            index,
            name: control.name.clone(),
            value: control.value,
            has_default: control.default.is_some(),
            default_value: control.default,
            lower_bound: control.lower,
            upper_bound: control.upper,
            bounded_below: control.bounded_below,
            bounded_above: control.bounded_above,
            toggled: control.toggled,
            integer: control.integer,
            logarithmic: control.logarithmic,
            output: control.output,
        }
    }
}
