//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

use std::any::Any;
use std::sync::Arc;

use crate::error::Error;
use crate::session::Session;

/// A PPP negotiation layer (LCP, authentication, CCP/IPCP/IPv6CP).
///
/// Layers are registered process-wide under one of the recognized layer
/// names, which determines the tier the layer starts in. The engine drives
/// each session's layers tier by tier; layers report progress back through
/// [`Session::layer_started`], [`Session::layer_passive`] and
/// [`Session::layer_finished`].
pub trait Layer: Send + Sync {
    /// Allocates the per-session state of this layer.
    ///
    /// The session descriptors aren't wired up yet; negotiation I/O must
    /// wait for `start`.
    fn init(&self, session: &mut Session) -> Box<dyn LayerData>;

    /// Starts negotiation of this layer.
    ///
    /// The layer may complete synchronously by calling
    /// [`Session::layer_started`] before returning. An error soft-terminates
    /// the session.
    fn start(
        &self,
        session: &mut Session,
        id: LayerId,
        data: &mut dyn LayerData,
    ) -> Result<(), Error>;

    /// Requests a graceful shutdown of this layer. The layer must eventually
    /// call [`Session::layer_finished`].
    fn finish(&self, session: &mut Session, id: LayerId, data: &mut dyn LayerData);
}

/// Per-session state of a layer, owned by the session's pipeline and dropped
/// when the session is released.
pub trait LayerData: Any + Send {
    /// An optional layer doesn't count towards its tier's completion.
    fn optional(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Identifies a layer instance within a session's pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LayerId {
    pub(crate) tier: usize,
    pub(crate) item: usize,
}

/// Process-wide list of registered layers, grouped into tiers ordered by
/// ascending tier number.
///
/// The registry is populated while the modules load and is frozen before
/// sessions are served; session contexts only ever read it.
#[derive(Default)]
pub struct LayerRegistry {
    tiers: Vec<RegistryTier>,
}

struct RegistryTier {
    order: u8,
    items: Vec<RegisteredLayer>,
}

struct RegisteredLayer {
    name: String,
    layer: Arc<dyn Layer>,
}

/// Per-session instantiation of the layer registry, preserving its tier
/// grouping and order.
pub(crate) struct LayerPipeline {
    pub(crate) tiers: Vec<PipelineTier>,
}

pub(crate) struct PipelineTier {
    pub(crate) items: Vec<LayerEntry>,
}

pub(crate) struct LayerEntry {
    pub(crate) name: String,
    pub(crate) layer: Arc<dyn Layer>,
    // Taken out of the entry while one of the layer's entry points runs.
    pub(crate) data: Option<Box<dyn LayerData>>,
    pub(crate) optional: bool,
    pub(crate) starting: bool,
    pub(crate) started: bool,
    pub(crate) passive: bool,
    pub(crate) finished: bool,
}

// ===== impl LayerRegistry =====

impl LayerRegistry {
    pub fn new() -> LayerRegistry {
        Default::default()
    }

    /// Registers a layer under one of the recognized layer names.
    ///
    /// Tiers are kept in ascending order; within a tier, layers keep their
    /// registration order.
    pub fn register(
        &mut self,
        name: &str,
        layer: Arc<dyn Layer>,
    ) -> Result<(), Error> {
        let order = layer_tier(name)
            .ok_or_else(|| Error::UnknownLayer(name.to_owned()))?;

        let tier = match self.tiers.iter().position(|tier| tier.order >= order)
        {
            Some(idx) if self.tiers[idx].order == order => &mut self.tiers[idx],
            Some(idx) => {
                self.tiers.insert(
                    idx,
                    RegistryTier {
                        order,
                        items: Vec::new(),
                    },
                );
                &mut self.tiers[idx]
            }
            None => {
                self.tiers.push(RegistryTier {
                    order,
                    items: Vec::new(),
                });
                self.tiers.last_mut().unwrap()
            }
        };
        tier.items.push(RegisteredLayer {
            name: name.to_owned(),
            layer,
        });

        Ok(())
    }

    /// Removes a previously registered layer. Emptied tiers remain in place.
    pub fn unregister(&mut self, layer: &Arc<dyn Layer>) {
        for tier in self.tiers.iter_mut() {
            tier.items.retain(|item| !same_layer(&item.layer, layer));
        }
    }

    /// Returns an iterator over the registered layers as (tier, name) pairs,
    /// in tier order.
    pub fn layers(&self) -> impl Iterator<Item = (u8, &str)> + '_ {
        self.tiers.iter().flat_map(|tier| {
            tier.items
                .iter()
                .map(move |item| (tier.order, item.name.as_str()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(|tier| tier.items.is_empty())
    }
}

// ===== impl LayerPipeline =====

impl LayerPipeline {
    // Clones the registry structure; the per-layer data is instantiated by
    // the session as part of `establish`.
    pub(crate) fn new(registry: &LayerRegistry) -> LayerPipeline {
        LayerPipeline {
            tiers: registry
                .tiers
                .iter()
                .map(|tier| PipelineTier {
                    items: tier
                        .items
                        .iter()
                        .map(|item| LayerEntry {
                            name: item.name.clone(),
                            layer: item.layer.clone(),
                            data: None,
                            optional: false,
                            starting: false,
                            started: false,
                            passive: false,
                            finished: false,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tiers.iter().all(|tier| tier.items.is_empty())
    }

    pub(crate) fn entry(&self, id: LayerId) -> Option<&LayerEntry> {
        self.tiers.get(id.tier)?.items.get(id.item)
    }

    pub(crate) fn entry_mut(&mut self, id: LayerId) -> Option<&mut LayerEntry> {
        self.tiers.get_mut(id.tier)?.items.get_mut(id.item)
    }

    // Returns the ids of every layer instance, in tier order.
    pub(crate) fn ids(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.tiers.iter().enumerate().flat_map(|(tier, node)| {
            (0..node.items.len()).map(move |item| LayerId { tier, item })
        })
    }

    pub(crate) fn tier_len(&self, tier: usize) -> usize {
        self.tiers.get(tier).map_or(0, |tier| tier.items.len())
    }
}

// ===== global functions =====

// Tier of each recognized layer name.
fn layer_tier(name: &str) -> Option<u8> {
    match name {
        "lcp" => Some(0),
        "auth" => Some(1),
        "ccp" | "ipcp" | "ipv6cp" => Some(2),
        _ => None,
    }
}

// Layer identity, ignoring the vtable metadata of the trait object.
pub(crate) fn same_layer(a: &Arc<dyn Layer>, b: &Arc<dyn Layer>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
