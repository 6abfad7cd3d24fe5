// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The session-wide effect chain every voice plays into:
//! master gain, lowpass filter, stereo panner (when the output has two channels), output.

use tracing::{info, warn};

use crate::audio::{AudioGraph, AudioSession, GraphError, NodeId, NodeKind, ParamName, DESTINATION};
use crate::params::{Knob, ParameterSet};

/// Rate of the filter LFO behind "motion".
pub const FILTER_LFO_HZ: f32 = 0.5;
/// Rate of the pan LFO behind "ambience".
pub const PAN_LFO_HZ: f32 = 0.2;
/// Butterworth Q.
const FILTER_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;
/// Knob changes glide over this long.
pub const PARAMETER_GLIDE_SECS: f64 = 0.1;

/// Handles to the persistent nodes of the chain.
#[derive(Debug, Clone, Copy)]
pub struct EffectChain {
    master: NodeId,
    filter: NodeId,
    motion_depth: NodeId,
    /// Depth of the pan LFO, when the output can pan.
    ambience_depth: Option<NodeId>,
}

impl EffectChain {
    /// Builds the chain and starts both LFOs. Only one chain may be built per session.
    pub fn build(session: &AudioSession, params: &ParameterSet) -> Result<EffectChain, GraphError> {
        session.claim_chain()?;
        let stereo = session.supported_effects().stereo_panner;
        let mut graph = session.graph();
        let now = graph.current_time();

        let master = graph.add(NodeKind::Gain {
            gain: params.master_gain(),
        });
        let filter = graph.add(NodeKind::Lowpass {
            frequency: params.cutoff_hz(),
            q: FILTER_Q,
        });
        graph.connect(master, filter)?;

        let filter_lfo = graph.add(NodeKind::Oscillator {
            frequency: FILTER_LFO_HZ,
        });
        let motion_depth = graph.add(NodeKind::Gain {
            gain: params.motion_depth(),
        });
        graph.connect(filter_lfo, motion_depth)?;
        graph.connect_param(motion_depth, filter, ParamName::Frequency)?;
        graph.start(filter_lfo, now)?;

        let ambience_depth = if stereo {
            let panner = graph.add(NodeKind::StereoPanner { pan: 0.0 });
            graph.connect(filter, panner)?;
            graph.connect(panner, DESTINATION)?;

            let lfo = graph.add(NodeKind::Oscillator {
                frequency: PAN_LFO_HZ,
            });
            let depth = graph.add(NodeKind::Gain {
                gain: params.ambience_depth(),
            });
            graph.connect(lfo, depth)?;
            graph.connect_param(depth, panner, ParamName::Pan)?;
            graph.start(lfo, now)?;
            Some(depth)
        } else {
            warn!("Output has no stereo panning; ambience is disabled");
            graph.connect(filter, DESTINATION)?;
            None
        };

        info!(stereo, "Effect chain built.");
        Ok(EffectChain {
            master,
            filter,
            motion_depth,
            ambience_depth,
        })
    }

    /// Where voices connect.
    pub fn input(&self) -> NodeId {
        self.master
    }

    pub fn supports_ambience(&self) -> bool {
        self.ambience_depth.is_some()
    }

    /// Glides the chain node a knob controls to its new value. Knobs that live on voices or
    /// only affect future iterations are ignored here, as is ambience without a panner.
    pub fn apply(
        &self,
        graph: &mut AudioGraph,
        knob: Knob,
        params: &ParameterSet,
    ) -> Result<(), GraphError> {
        let (node, param, value) = match knob {
            Knob::Volume => (self.master, ParamName::Gain, params.master_gain()),
            Knob::Cutoff => (self.filter, ParamName::Frequency, params.cutoff_hz()),
            Knob::Motion => (self.motion_depth, ParamName::Gain, params.motion_depth()),
            Knob::Ambience => match self.ambience_depth {
                Some(depth) => (depth, ParamName::Gain, params.ambience_depth()),
                None => return Ok(()),
            },
            Knob::Mix | Knob::FadeTime | Knob::BaseLayer => return Ok(()),
        };
        let now = graph.current_time();
        graph
            .param_mut(node, param)?
            .ramp_from_now(value, now, PARAMETER_GLIDE_SECS);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::audio::mock;
    use crate::config;
    use crate::params::MAX_MOTION_DEPTH_HZ;

    fn session(channels: u16) -> AudioSession {
        let device = mock::Device::get(
            &config::Audio::new("offline")
                .with_sample_rate(1000)
                .with_channels(channels),
        );
        AudioSession::open(Arc::new(device)).unwrap()
    }

    #[test]
    fn test_build_once() -> Result<(), GraphError> {
        let session = session(2);
        let params = ParameterSet::default();
        let chain = EffectChain::build(&session, &params)?;
        assert!(chain.supports_ambience());
        // master, filter, filter LFO, motion depth, panner, pan LFO, ambience depth + destination
        assert_eq!(8, session.graph().node_count());

        assert!(matches!(
            EffectChain::build(&session, &params),
            Err(GraphError::AlreadyBuilt)
        ));
        assert_eq!(8, session.graph().node_count());
        Ok(())
    }

    #[test]
    fn test_mono_output_disables_ambience() -> Result<(), GraphError> {
        let session = session(1);
        let params = ParameterSet::default();
        let chain = EffectChain::build(&session, &params)?;
        assert!(!chain.supports_ambience());

        let mut graph = session.graph();
        chain.apply(&mut graph, Knob::Ambience, &params)?;
        Ok(())
    }

    #[test]
    fn test_apply_glides() -> Result<(), GraphError> {
        let session = session(2);
        let mut params = ParameterSet::default();
        let chain = EffectChain::build(&session, &params)?;

        params.motion = 100.0;
        params.volume = 0.0;
        let mut graph = session.graph();
        for knob in [Knob::Motion, Knob::Volume] {
            chain.apply(&mut graph, knob, &params)?;
        }

        let now = graph.current_time();
        assert_eq!(
            MAX_MOTION_DEPTH_HZ,
            graph.param_value_at(chain.motion_depth, ParamName::Gain, now + PARAMETER_GLIDE_SECS)?
        );
        assert_eq!(
            0.0,
            graph.param_value_at(chain.input(), ParamName::Gain, now + PARAMETER_GLIDE_SECS)?
        );
        assert_eq!(
            0.7,
            graph.param_value_at(chain.input(), ParamName::Gain, now)?
        );
        Ok(())
    }
}
