use tracing::debug;

use super::{AudioPlugin, Control, PortKind};
use crate::command::ControlRef;
use crate::error::ControlError;

/// Most audio buffers tracked per direction.
const MAX_AUDIO_BUFFERS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Input(usize),
    Output(usize),
    SpareInput,
    SpareOutput,
    Control(usize),
    Unconnected,
}

/// One hosted plugin instance together with the buffers and control cells
/// its ports are connected to.
///
/// Every port is reconnected right before each run, so buffers may move with
/// the filter and no pointer into the filter is ever held across calls.
pub struct Filter {
    plugin: Box<dyn AudioPlugin>,
    enabled: bool,
    frame_count: u64,
    in_count: usize,
    out_count: usize,
    in_place: bool,
    audio_in_ports: [usize; MAX_AUDIO_BUFFERS],
    audio_out_ports: [usize; MAX_AUDIO_BUFFERS],
    inputs: [Box<[f32]>; MAX_AUDIO_BUFFERS],
    outputs: [Box<[f32]>; MAX_AUDIO_BUFFERS],
    spare_in: Box<[f32]>,
    spare_out: Box<[f32]>,
    bindings: Vec<Binding>,
    controls: Vec<Control>,
    block: usize,
}

impl Filter {
    /// Wraps a freshly instantiated plugin. The filter starts disabled.
    pub fn new(plugin: Box<dyn AudioPlugin>, sample_rate: u32, block: usize) -> Self {
        let block = block.max(1);
        let mut in_count = 0;
        let mut out_count = 0;
        let mut audio_in_ports = [0; MAX_AUDIO_BUFFERS];
        let mut audio_out_ports = [0; MAX_AUDIO_BUFFERS];
        let mut bindings = Vec::with_capacity(plugin.ports().len());
        let mut controls = Vec::new();

        for (port, info) in plugin.ports().iter().enumerate() {
            let binding = match info.kind {
                Some(PortKind::AudioInput) if in_count < MAX_AUDIO_BUFFERS => {
                    audio_in_ports[in_count] = port;
                    in_count += 1;
                    Binding::Input(in_count - 1)
                }
                Some(PortKind::AudioOutput) if out_count < MAX_AUDIO_BUFFERS => {
                    audio_out_ports[out_count] = port;
                    out_count += 1;
                    Binding::Output(out_count - 1)
                }
                Some(PortKind::AudioInput) => Binding::SpareInput,
                Some(PortKind::AudioOutput) => Binding::SpareOutput,
                Some(PortKind::ControlInput | PortKind::ControlOutput) => {
                    controls.push(Control::from_port(port, info, sample_rate));
                    Binding::Control(controls.len() - 1)
                }
                None => Binding::Unconnected,
            };
            bindings.push(binding);
        }

        let in_place = !plugin.inplace_broken() && in_count > 0 && out_count > 0;
        let buffer = || vec![0.0f32; block].into_boxed_slice();

        let mut filter = Self {
            plugin,
            enabled: false,
            frame_count: 0,
            in_count,
            out_count,
            in_place,
            audio_in_ports,
            audio_out_ports,
            inputs: [buffer(), buffer()],
            outputs: [buffer(), buffer()],
            spare_in: buffer(),
            spare_out: buffer(),
            bindings,
            controls,
            block,
        };
        filter.connect_all();
        filter
    }

    pub fn label(&self) -> &str {
        self.plugin.label()
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of processing passes run since the filter was loaded.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn in_buf_count(&self) -> usize {
        self.in_count
    }

    pub fn out_buf_count(&self) -> usize {
        self.out_count
    }

    /// Input and matching output share one buffer.
    pub fn in_place(&self) -> bool {
        self.in_place
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Activates the plugin on the disabled to enabled transition only.
    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.plugin.activate();
        self.enabled = true;
        debug!(
            label = self.plugin.label(),
            inputs = self.in_count,
            outputs = self.out_count,
            in_place = self.in_place,
            controls = self.controls.len(),
            "filter enabled"
        );
    }

    /// Deactivates the plugin on the enabled to disabled transition only.
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.plugin.deactivate();
        self.enabled = false;
        debug!(label = self.plugin.label(), "filter disabled");
    }

    pub fn control_index(&self, name: &str) -> Option<usize> {
        self.controls.iter().position(|c| c.name() == name)
    }

    fn resolve(&self, control: &ControlRef) -> Result<usize, ControlError> {
        match control {
            ControlRef::Name(name) => self
                .control_index(name)
                .ok_or_else(|| ControlError::NoSuchName(name.clone())),
            ControlRef::Index(index) if *index < self.controls.len() => Ok(*index),
            ControlRef::Index(index) => Err(ControlError::NoSuchIndex(*index)),
        }
    }

    pub fn set_control(&mut self, control: &ControlRef, value: f32) -> Result<f32, ControlError> {
        let index = self.resolve(control)?;
        self.controls[index].set(value)
    }

    pub fn set_control_by_name(&mut self, name: &str, value: f32) -> Result<f32, ControlError> {
        self.set_control(&ControlRef::Name(name.to_owned()), value)
    }

    pub fn set_control_by_index(&mut self, index: usize, value: f32) -> Result<f32, ControlError> {
        self.set_control(&ControlRef::Index(index), value)
    }

    pub fn control_value(&self, control: &ControlRef) -> Result<f32, ControlError> {
        self.resolve(control).map(|index| self.controls[index].value())
    }

    /// Runs the filter over a stereo block, replacing `left`/`right` with its
    /// output. Disabled filters leave the block untouched.
    pub fn run_stereo(&mut self, left: &mut [f32], right: &mut [f32]) {
        if !self.enabled {
            return;
        }
        let len = left.len().min(right.len());
        let block = self.block;
        for (l, r) in left[..len]
            .chunks_mut(block)
            .zip(right[..len].chunks_mut(block))
        {
            self.process_block(l, r);
        }
    }

    fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        let n = left.len();
        if n == 0 {
            return;
        }

        if self.in_place && self.in_count == 2 && self.out_count == 2 {
            self.connect_all();
            let [in_l, in_r] = self.audio_in_ports;
            let [out_l, out_r] = self.audio_out_ports;
            // SAFETY: the caller's slices hold `n` samples and outlive the run;
            // every other port was just connected to filter-owned memory.
            unsafe {
                self.plugin.connect_port(in_l, left.as_mut_ptr());
                self.plugin.connect_port(out_l, left.as_mut_ptr());
                self.plugin.connect_port(in_r, right.as_mut_ptr());
                self.plugin.connect_port(out_r, right.as_mut_ptr());
                self.plugin.run(n);
            }
            self.frame_count += 1;
            return;
        }

        match self.in_count {
            2 => {
                self.input_slot(0)[..n].copy_from_slice(left);
                self.input_slot(1)[..n].copy_from_slice(right);
            }
            1 => {
                let mono = self.input_slot(0);
                for ((m, l), r) in mono.iter_mut().zip(left.iter()).zip(right.iter()) {
                    *m = (*l + *r) * 0.5;
                }
            }
            _ => {}
        }

        self.connect_all();
        // SAFETY: all ports are connected to filter-owned buffers of `block`
        // samples and `n <= block`.
        unsafe { self.plugin.run(n) };
        self.frame_count += 1;

        match self.out_count {
            2 => {
                left.copy_from_slice(&self.outputs[0][..n]);
                right.copy_from_slice(&self.outputs[1][..n]);
            }
            1 => {
                left.copy_from_slice(&self.outputs[0][..n]);
                right.copy_from_slice(&self.outputs[0][..n]);
            }
            _ => {}
        }
    }

    fn input_slot(&mut self, slot: usize) -> &mut [f32] {
        if self.in_place && slot < self.out_count {
            &mut self.outputs[slot]
        } else {
            &mut self.inputs[slot]
        }
    }

    fn connect_all(&mut self) {
        let Self {
            plugin,
            in_place,
            out_count,
            inputs,
            outputs,
            spare_in,
            spare_out,
            bindings,
            controls,
            ..
        } = self;

        spare_in.fill(0.0);
        for (port, binding) in bindings.iter().enumerate() {
            let data = match *binding {
                Binding::Input(slot) if *in_place && slot < *out_count => outputs[slot].as_mut_ptr(),
                Binding::Input(slot) => inputs[slot].as_mut_ptr(),
                Binding::Output(slot) => outputs[slot].as_mut_ptr(),
                Binding::SpareInput => spare_in.as_mut_ptr(),
                Binding::SpareOutput => spare_out.as_mut_ptr(),
                Binding::Control(index) => controls[index].value_ptr(),
                Binding::Unconnected => continue,
            };
            // SAFETY: every target is owned by this filter, sized for `block`
            // samples (or one control cell), and reconnected before each run.
            unsafe { plugin.connect_port(port, data) };
        }
    }
}

impl Drop for Filter {
    fn drop(&mut self) {
        self.disable();
        self.plugin.cleanup();
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("label", &self.plugin.label())
            .field("enabled", &self.enabled)
            .field("inputs", &self.in_count)
            .field("outputs", &self.out_count)
            .field("in_place", &self.in_place)
            .field("controls", &self.controls.len())
            .finish()
    }
}
