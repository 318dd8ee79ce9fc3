//! Convolutional feature backbone
//!
//! A stack of Conv → BatchNorm → ReLU → MaxPool blocks followed by global
//! average pooling. Produces one feature vector per image; the classifier
//! puts a bottleneck and a head on top.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::error::{DaError, Result as DaResult};

/// Named backbone presets selectable from the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackboneArch {
    /// 4 blocks, 32 → 256 filters
    #[default]
    Cnn,
    /// 3 blocks, 16 → 64 filters
    CnnLite,
}

impl BackboneArch {
    pub fn config(&self) -> BackboneConfig {
        match self {
            Self::Cnn => BackboneConfig::new(),
            Self::CnnLite => BackboneConfig::new().with_base_filters(16).with_num_blocks(3),
        }
    }
}

impl FromStr for BackboneArch {
    type Err = DaError;

    fn from_str(s: &str) -> DaResult<Self> {
        match s.to_lowercase().as_str() {
            "cnn" => Ok(Self::Cnn),
            "cnn-lite" | "cnn_lite" | "lite" => Ok(Self::CnnLite),
            other => Err(DaError::Config(format!(
                "unknown architecture '{}' (expected cnn or cnn-lite)",
                other
            ))),
        }
    }
}

impl fmt::Display for BackboneArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cnn => write!(f, "cnn"),
            Self::CnnLite => write!(f, "cnn-lite"),
        }
    }
}

/// Configuration for the convolutional backbone
#[derive(Config, Debug)]
pub struct BackboneConfig {
    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters of the first block; doubled by every following block
    #[config(default = "32")]
    pub base_filters: usize,

    /// Number of conv blocks
    #[config(default = "4")]
    pub num_blocks: usize,
}

impl BackboneConfig {
    /// Dimension of the pooled feature vector
    pub fn out_features(&self) -> usize {
        self.base_filters << self.num_blocks.saturating_sub(1)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Backbone<B> {
        let mut blocks = Vec::with_capacity(self.num_blocks);
        let mut in_channels = self.in_channels;
        for i in 0..self.num_blocks {
            let out_channels = self.base_filters << i;
            blocks.push(ConvBlock::new(in_channels, out_channels, 3, true, device));
            in_channels = out_channels;
        }

        Backbone {
            blocks,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            out_features: self.out_features(),
        }
    }
}

/// A CNN block with Conv2d, BatchNorm, ReLU, and optional MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B>,
    pub relu: Relu,
    pub pool: Option<MaxPool2d>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        with_pool: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        let pool = if with_pool {
            Some(MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init())
        } else {
            None
        };

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);

        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }
}

/// Feature extractor: conv blocks + global average pooling
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    out_features: usize,
}

impl<B: Backend> Backbone<B> {
    /// `[N, 3, H, W]` → `[N, out_features]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Replace the parameters with a full-precision named MessagePack record
    pub fn load_pretrained(self, path: &Path, device: &B::Device) -> DaResult<Self> {
        info!("Loading backbone weights from {:?}", path);
        self.load_file(path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new(), device)
            .map_err(|e| DaError::Model(format!("cannot load backbone weights {}: {}", path.display(), e)))
    }
}
