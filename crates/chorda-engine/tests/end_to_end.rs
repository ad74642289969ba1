mod common;

use chorda_engine::{ControlError, FilterError, StereoFrame, SynthError};
use common::{Fixture, LEVEL};

const CHANNEL: usize = 3;

fn render(fixture: &Fixture, frames: usize) -> Vec<StereoFrame> {
    (0..frames)
        .map(|_| {
            let mut frame = StereoFrame::silent();
            assert!(fixture.synth.pull(1, &mut frame).expect("pull"));
            frame
        })
        .collect()
}

#[test]
fn filter_chain_lifecycle_shapes_output() {
    let mut fixture = Fixture::new();
    fixture.synth.start().expect("start");
    fixture.synth.select(CHANNEL, 1, 0, 0).expect("select");
    fixture.synth.note_on(CHANNEL, 60, 100).expect("note on");

    let baseline = render(&fixture, 10);
    assert!(baseline
        .iter()
        .all(|frame| frame.left.iter().all(|s| (*s - LEVEL).abs() < 1e-6)));

    fixture
        .synth
        .add_filter(CHANNEL, "/plugins/reverb.so", "reverb")
        .expect("add reverb");
    let duplicate = fixture
        .synth
        .add_filter(CHANNEL, "/plugins/reverb.so", "reverb")
        .unwrap_err();
    assert!(matches!(
        duplicate,
        SynthError::Filter(FilterError::Duplicate(ref label)) if label == "reverb"
    ));
    assert_eq!(fixture.synth.chain_len(CHANNEL).unwrap(), 1);
    assert_eq!(fixture.plugins.loads(), 1);

    let rejected = fixture
        .synth
        .set_control(CHANNEL, "reverb", "Decay", 7.0)
        .unwrap_err();
    assert!(matches!(
        rejected,
        SynthError::Control(ControlError::AboveBounds { .. })
    ));
    assert_eq!(
        fixture
            .synth
            .get_control_value(CHANNEL, "reverb", "Decay")
            .unwrap(),
        1.0
    );

    // A freshly added filter stays bypassed until enabled.
    assert_eq!(render(&fixture, 10), baseline);
    assert!(!fixture.synth.filter_is_enabled(CHANNEL).unwrap());

    fixture.synth.enable_filter(CHANNEL, "reverb").expect("enable");
    let filtered = render(&fixture, 10);
    assert_ne!(filtered, baseline);
    assert!(filtered
        .iter()
        .all(|frame| frame.right.iter().all(|s| (*s - LEVEL / 2.0).abs() < 1e-6)));

    assert_eq!(fixture.synth.remove_filter(CHANNEL, None).unwrap(), 1);
    assert_eq!(fixture.synth.chain_len(CHANNEL).unwrap(), 0);
    assert_eq!(render(&fixture, 10), baseline);

    fixture.synth.stop();
}

#[test]
fn gain_scales_only_while_a_filter_runs() {
    let mut fixture = Fixture::new();
    fixture.synth.start().expect("start");
    fixture.synth.select(CHANNEL, 1, 0, 0).expect("select");
    fixture.synth.note_on(CHANNEL, 64, 90).expect("note on");

    fixture.synth.set_gain(CHANNEL, 1.0).expect("gain");
    let unfiltered = render(&fixture, 1);
    assert!((unfiltered[0].left[0] - LEVEL).abs() < 1e-6);

    fixture
        .synth
        .add_filter(CHANNEL, "/plugins/reverb.so", "reverb")
        .expect("add reverb");
    fixture.synth.enable_filter(CHANNEL, "reverb").expect("enable");
    fixture
        .synth
        .set_control(CHANNEL, "reverb", "Decay", 0.0)
        .expect("decay");
    let doubled = render(&fixture, 1);
    assert!((doubled[0].left[0] - 2.0 * LEVEL).abs() < 1e-6);
}

#[test]
fn unknown_label_leaves_chain_untouched() {
    let mut fixture = Fixture::new();
    fixture.synth.start().expect("start");
    let err = fixture
        .synth
        .add_filter(CHANNEL, "/plugins/reverb.so", "chorus")
        .unwrap_err();
    assert!(matches!(
        err,
        SynthError::Filter(FilterError::LabelNotFound { .. })
    ));
    assert_eq!(fixture.synth.chain_len(CHANNEL).unwrap(), 0);
}

#[test]
fn stop_tears_down_chains() {
    let mut fixture = Fixture::new();
    fixture.synth.start().expect("start");
    fixture
        .synth
        .add_filter(CHANNEL, "/plugins/reverb.so", "reverb")
        .expect("add reverb");
    fixture.synth.stop();
    assert_eq!(fixture.synth.chain_len(CHANNEL).unwrap(), 0);
    assert_eq!(fixture.synth.state().bound_soundfont(CHANNEL), None);
}
