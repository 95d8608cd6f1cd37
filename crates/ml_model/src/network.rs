//! Dense feed-forward network shared by the gradient-trained families.

use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

/// A feed-forward network with ReLU hidden layers and a linear output.
///
/// With no hidden layers this is a plain linear (or, with a softmax on the
/// output, logistic) model.
#[derive(Module, Debug)]
pub struct DenseNetwork<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> DenseNetwork<B> {
    /// Creates a network mapping `inputs` features to `outputs` values.
    pub fn new(device: &B::Device, inputs: usize, hidden_sizes: &[usize], outputs: usize) -> Self {
        let mut hidden = Vec::with_capacity(hidden_sizes.len());
        let mut width = inputs;
        for &size in hidden_sizes {
            hidden.push(LinearConfig::new(width, size).init(device));
            width = size;
        }

        Self {
            hidden,
            output: LinearConfig::new(width, outputs).init(device),
            activation: Relu::new(),
        }
    }

    /// Forward pass through the network.
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape [`batch_size`, `inputs`]
    ///
    /// # Returns
    ///
    /// Tensor of shape [`batch_size`, `outputs`].
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self
            .hidden
            .iter()
            .fold(input, |x, layer| self.activation.forward(layer.forward(x)));
        self.output.forward(x)
    }
}
