//! End-to-end engine tests: full blocks through rings, FFT, lanes and
//! overlap-add.

use sw_core::{BlockSize, Sample, SampleRate};
use sw_dsp::{EffectKind, WindowKind};
use sw_engine::{LaneInput, SoundEngine};

const BLOCK: usize = 128;

fn engine() -> SoundEngine {
    SoundEngine::new(
        2,
        BlockSize::Samples128,
        SampleRate::Hz48000,
        WindowKind::Hann,
        7,
    )
    .unwrap()
}

fn run_block(engine: &mut SoundEngine, block: &[Sample]) -> Vec<Sample> {
    assert_eq!(block.len(), BLOCK);
    let input = [block, block];
    let mut left = vec![0.0; BLOCK];
    let mut right = vec![0.0; BLOCK];
    {
        let mut output = [&mut left[..], &mut right[..]];
        engine.process(&input, &mut output);
    }
    left
}

fn sine_block(offset: usize, period: usize) -> Vec<Sample> {
    (0..BLOCK)
        .map(|i| (2.0 * std::f64::consts::PI * ((offset + i) % period) as f64 / period as f64).sin())
        .collect()
}

#[test]
fn sine_round_trips_through_a_no_op_filter() {
    let mut engine = engine();
    engine.effects_mut().add_lane(LaneInput::Channel(0), Some(0)).unwrap();
    engine.effects_mut().add_module(0, EffectKind::Filter).unwrap();
    engine.set_dry_wet(1.0);

    // Period 16 puts the tone exactly on bin 8 of a 128-sample frame
    let period = 16;
    let mut out = Vec::new();
    for block in 0..24 {
        out = run_block(&mut engine, &sine_block(block * BLOCK, period));
    }

    // Steady state: still a sine of the same period and amplitude
    for i in 0..BLOCK - period {
        assert!(
            (out[i] - out[i + period]).abs() < 1e-4,
            "sample {i} not periodic: {} vs {}",
            out[i],
            out[i + period]
        );
    }
    let rms = (out.iter().map(|s| s * s).sum::<f64>() / BLOCK as f64).sqrt();
    assert!(
        (rms - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-3,
        "rms was {rms}"
    );
}

#[test]
fn parallel_lanes_sum_to_one_contribution() {
    // Three pass-through lanes on the same output channel: each is scaled
    // by 1/3, so the sum equals a single lane's contribution
    let mut engine = engine();
    for _ in 0..3 {
        engine.effects_mut().add_lane(LaneInput::Channel(0), Some(0)).unwrap();
    }
    engine.set_dry_wet(1.0);

    let dc = vec![1.0; BLOCK];
    for _ in 0..16 {
        run_block(&mut engine, &dc);
    }
    let out = run_block(&mut engine, &dc);
    for &s in &out {
        assert!((s - 1.0).abs() < 1e-5, "summed sample was {s}");
    }
}

#[test]
fn chained_lanes_process_in_dependency_order() {
    let mut engine = engine();
    let first = engine.effects_mut().add_lane(LaneInput::Channel(0), None).unwrap();
    let second = engine
        .effects_mut()
        .add_lane(LaneInput::Lane(first), Some(0))
        .unwrap();
    engine.effects_mut().add_module(second, EffectKind::Filter).unwrap();
    engine.set_dry_wet(1.0);

    let dc = vec![1.0; BLOCK];
    for _ in 0..16 {
        run_block(&mut engine, &dc);
    }
    let out = run_block(&mut engine, &dc);
    for &s in &out {
        assert!((s - 1.0).abs() < 1e-5, "chained sample was {s}");
    }
}

#[test]
fn feedback_rejected_and_engine_keeps_running() {
    let mut engine = engine();
    engine.effects_mut().add_lane(LaneInput::Channel(0), None).unwrap();
    engine.effects_mut().add_lane(LaneInput::Lane(0), Some(0)).unwrap();

    // Closing the loop is refused before any worker can see the edge
    assert!(engine.effects_mut().set_lane_input(0, LaneInput::Lane(1)).is_err());
    // A lane cannot be born referencing a lane that does not exist yet
    assert!(engine.effects_mut().add_lane(LaneInput::Lane(7), None).is_err());

    // The rejected edit left the graph intact: a block still completes
    let dc = vec![0.5; BLOCK];
    for _ in 0..4 {
        run_block(&mut engine, &dc);
    }
}

#[test]
fn order_decrease_remaps_effect_regions() {
    // Gate only the [0, 0.15] band; a tone at normalized 0.25 sits outside
    let mut engine = SoundEngine::new(
        2,
        BlockSize::Samples128,
        SampleRate::Hz48000,
        WindowKind::Hann,
        9,
    )
    .unwrap();
    engine.effects_mut().add_lane(LaneInput::Channel(0), Some(0)).unwrap();
    engine.effects_mut().add_module(0, EffectKind::Destroy).unwrap();
    engine
        .effects_mut()
        .edit_module(0, 0, |m| {
            *m.effect.bounds_mut() = sw_dsp::Bounds::mono(0.0, 0.15);
            if let sw_dsp::Effect::Destroy(fx) = &mut m.effect {
                fx.threshold = wide::f64x4::splat(1.1);
            }
        })
        .unwrap();
    engine.set_dry_wet(1.0);

    // Period 8 is bin 64 of the 512-sample frame and bin 16 of the
    // 128-sample frame: normalized 0.25 at both orders
    let period = 8;
    for block in 0..16 {
        run_block(&mut engine, &sine_block(block * BLOCK, period));
    }
    engine.set_order(7).unwrap();

    // The smaller frame must renormalize the gated band against its own
    // bin count; stale high bins from the larger order would stretch the
    // band over the tone and silence it
    let mut out = Vec::new();
    for block in 16..48 {
        out = run_block(&mut engine, &sine_block(block * BLOCK, period));
    }
    let rms = (out.iter().map(|s| s * s).sum::<f64>() / BLOCK as f64).sqrt();
    assert!(
        (rms - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-3,
        "rms after order decrease was {rms}"
    );
}

#[test]
fn pure_dry_mix_bypasses_the_wet_path() {
    let mut engine = engine();
    engine.effects_mut().add_lane(LaneInput::Channel(0), Some(0)).unwrap();
    engine.effects_mut().add_module(0, EffectKind::Destroy).unwrap();
    engine
        .effects_mut()
        .edit_module(0, 0, |m| {
            if let sw_dsp::Effect::Destroy(fx) = &mut m.effect {
                fx.threshold = wide::f64x4::splat(1.1);
            }
        })
        .unwrap();
    engine.set_dry_wet(0.0);

    let dc = vec![0.75; BLOCK];
    for _ in 0..16 {
        run_block(&mut engine, &dc);
    }
    let out = run_block(&mut engine, &dc);
    // The destroy effect gates everything, but at mix 0 the output is the
    // delayed dry signal
    for &s in &out {
        assert!((s - 0.75).abs() < 1e-12, "dry sample was {s}");
    }
}
