use std::num::NonZeroUsize;

use crate::{
    MlErr, Result,
    arch::{Sequential, activations::ActFn, layers::Dense},
};

/// Activation selection for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActFnSpec {
    Sigmoid,
}

impl ActFnSpec {
    fn build(self) -> ActFn {
        match self {
            ActFnSpec::Sigmoid => ActFn::sigmoid(),
        }
    }
}

/// One dense layer of the network.
#[derive(Debug, Clone, Copy)]
pub struct LayerSpec {
    pub input: NonZeroUsize,
    pub output: NonZeroUsize,
    pub act_fn: Option<ActFnSpec>,
}

impl LayerSpec {
    /// Returns the amount of parameters this layer takes, weights plus biases.
    pub fn param_count(&self) -> usize {
        (self.input.get() + 1) * self.output.get()
    }
}

/// The network topology.
///
/// Every process builds its model from the same `NetSpec`, which is what lets
/// the parameter server size its storage without ever running a forward pass:
/// the flat parameter layout is fully determined by the layer dimensions.
#[derive(Debug, Clone)]
pub struct NetSpec {
    layers: Vec<LayerSpec>,
}

impl NetSpec {
    /// Creates a new `NetSpec`.
    ///
    /// # Arguments
    /// * `layers` - The dense layers, in forward order.
    ///
    /// # Returns
    /// A new `NetSpec`, or an error if the list is empty or adjacent layer
    /// dimensions disagree.
    pub fn new(layers: Vec<LayerSpec>) -> Result<Self> {
        if layers.is_empty() {
            return Err(MlErr::EmptyModel);
        }

        for (i, pair) in layers.windows(2).enumerate() {
            let prev_output = pair[0].output.get();
            let input = pair[1].input.get();

            if prev_output != input {
                return Err(MlErr::LayerDimMismatch {
                    layer: i + 1,
                    input,
                    prev_output,
                });
            }
        }

        Ok(Self { layers })
    }

    /// Returns the layer descriptions in forward order.
    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    /// Returns the total amount of parameters of the network.
    pub fn param_count(&self) -> usize {
        self.layers.iter().map(LayerSpec::param_count).sum()
    }

    /// Returns the amount of input values the network consumes per sample.
    pub fn input_size(&self) -> usize {
        self.layers[0].input.get()
    }

    /// Returns the amount of output values the network produces per sample.
    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].output.get()
    }

    /// Instantiates the model this topology describes.
    pub fn build(&self) -> Sequential {
        Sequential::new(self.layers.iter().map(|layer| {
            Dense::new(
                (layer.input.get(), layer.output.get()),
                layer.act_fn.map(ActFnSpec::build),
            )
        }))
    }
}
