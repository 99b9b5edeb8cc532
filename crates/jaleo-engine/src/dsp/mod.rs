pub mod effect;
pub mod gain;
pub mod resample;

pub use effect::{Effect, EffectCell, EffectEngine, EffectKind};
pub use gain::{percent_to_gain, scale, GainCell};
pub use resample::{interpolate_steps, resample, resample_by};
