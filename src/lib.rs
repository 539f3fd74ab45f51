//! civitai-analyzer - prompt pattern analysis for Civitai collections
//!
//! Fetches image generation metadata from a collection through Civitai's tRPC
//! API and aggregates it: prompt style (tag list vs natural language), recurring
//! concepts and phrases, and the models, LoRAs, samplers and settings in use.

pub mod analysis;
pub mod civitai;
pub mod cli;
pub mod config;
pub mod console;
pub mod util;
