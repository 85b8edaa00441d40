//! The static schema table, one entry per transform kind in canonical order.

use super::{ChoiceOption, KindSchema, ParamKind, ParamSpec};
use crate::types::TransformKind;

const fn scalar(
    key: &'static str,
    engine_arg: &'static str,
    min: f64,
    max: f64,
    step: f64,
    default: f64,
) -> ParamSpec {
    ParamSpec {
        key,
        engine_arg,
        kind: ParamKind::Scalar { min, max, step, integer: false, default },
    }
}

const fn integer(key: &'static str, engine_arg: &'static str, min: f64, max: f64, default: f64) -> ParamSpec {
    ParamSpec {
        key,
        engine_arg,
        kind: ParamKind::Scalar { min, max, step: 1.0, integer: true, default },
    }
}

const fn pair(
    key: &'static str,
    engine_arg: &'static str,
    min: f64,
    max: f64,
    step: f64,
    default: (f64, f64),
) -> ParamSpec {
    ParamSpec {
        key,
        engine_arg,
        kind: ParamKind::Pair { min, max, step, default },
    }
}

const fn choice(
    key: &'static str,
    engine_arg: &'static str,
    options: &'static [ChoiceOption],
    default: &'static str,
) -> ParamSpec {
    ParamSpec {
        key,
        engine_arg,
        kind: ParamKind::Choice { options, default },
    }
}

const FLIP_AXES: &[ChoiceOption] = &[
    ChoiceOption { key: "lr", label: "Left-Right", engine_literal: "('LR',)" },
    ChoiceOption { key: "ap", label: "Anterior-Posterior", engine_literal: "('AP',)" },
    ChoiceOption { key: "is", label: "Inferior-Superior", engine_literal: "('IS',)" },
];

const ANISOTROPY_AXES: &[ChoiceOption] = &[
    ChoiceOption { key: "0", label: "Axis 0", engine_literal: "(0,)" },
    ChoiceOption { key: "1", label: "Axis 1", engine_literal: "(1,)" },
    ChoiceOption { key: "2", label: "Axis 2", engine_literal: "(2,)" },
];

const FLIP: &[ParamSpec] = &[
    choice("axes", "axes", FLIP_AXES, "lr"),
    scalar("p", "p", 0.0, 1.0, 0.05, 0.5),
];

const AFFINE: &[ParamSpec] = &[
    pair("scales", "scales", 0.5, 1.5, 0.01, (0.9, 1.1)),
    scalar("degrees", "degrees", 0.0, 180.0, 1.0, 10.0),
    scalar("translation", "translation", 0.0, 50.0, 1.0, 5.0),
];

const ELASTIC: &[ParamSpec] = &[
    integer("numControlPoints", "num_control_points", 5.0, 20.0, 7.0),
    scalar("maxDisplacement", "max_displacement", 0.0, 30.0, 0.5, 7.0),
];

const ANISOTROPY: &[ParamSpec] = &[
    choice("axes", "axes", ANISOTROPY_AXES, "2"),
    scalar("downsampling", "downsampling", 1.0, 10.0, 0.5, 2.0),
];

const MOTION: &[ParamSpec] = &[
    scalar("degrees", "degrees", 0.0, 90.0, 1.0, 10.0),
    scalar("translation", "translation", 0.0, 50.0, 1.0, 10.0),
    integer("numTransforms", "num_transforms", 1.0, 10.0, 2.0),
];

const GHOSTING: &[ParamSpec] = &[
    integer("numGhosts", "num_ghosts", 1.0, 20.0, 4.0),
    scalar("intensity", "intensity", 0.0, 2.0, 0.05, 0.5),
];

const SPIKE: &[ParamSpec] = &[
    integer("numSpikes", "num_spikes", 1.0, 10.0, 1.0),
    scalar("intensity", "intensity", 0.0, 5.0, 0.1, 1.0),
];

const SWAP: &[ParamSpec] = &[
    integer("patchSize", "patch_size", 1.0, 64.0, 15.0),
    integer("numIterations", "num_iterations", 1.0, 1000.0, 100.0),
];

const NOISE: &[ParamSpec] = &[
    scalar("mean", "mean", -1.0, 1.0, 0.01, 0.0),
    scalar("std", "std", 0.0, 1.0, 0.01, 0.1),
];

const GAMMA: &[ParamSpec] = &[pair("logGamma", "log_gamma", -1.0, 1.0, 0.05, (-0.3, 0.3))];

const BIAS: &[ParamSpec] = &[
    scalar("coefficients", "coefficients", 0.0, 2.0, 0.05, 0.5),
    integer("order", "order", 1.0, 6.0, 3.0),
];

const BLUR: &[ParamSpec] = &[pair("std", "std", 0.0, 10.0, 0.1, (0.0, 2.0))];

/// Every transform kind, indexed by [`TransformKind::priority`].
pub static SCHEMA: [KindSchema; 12] = [
    KindSchema { kind: TransformKind::Flip, params: FLIP },
    KindSchema { kind: TransformKind::Affine, params: AFFINE },
    KindSchema { kind: TransformKind::Elastic, params: ELASTIC },
    KindSchema { kind: TransformKind::Anisotropy, params: ANISOTROPY },
    KindSchema { kind: TransformKind::Motion, params: MOTION },
    KindSchema { kind: TransformKind::Ghosting, params: GHOSTING },
    KindSchema { kind: TransformKind::Spike, params: SPIKE },
    KindSchema { kind: TransformKind::Swap, params: SWAP },
    KindSchema { kind: TransformKind::Noise, params: NOISE },
    KindSchema { kind: TransformKind::Gamma, params: GAMMA },
    KindSchema { kind: TransformKind::Bias, params: BIAS },
    KindSchema { kind: TransformKind::Blur, params: BLUR },
];
