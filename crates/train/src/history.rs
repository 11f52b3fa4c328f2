//! Append-only record of validation epochs.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// One row per validation epoch, stored column-wise.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct History {
    pub val_epochs: Vec<usize>,
    pub loss_train: Vec<f32>,
    /// Controller-transformed per-difficulty validation loss.
    pub loss_val_distr: Vec<Vec<f32>>,
    pub loss_val_avg: Vec<f32>,
    /// Controller's sampling distribution at the time of validation.
    pub difficulty_distr: Vec<Vec<f32>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        epoch: usize,
        train_loss: f32,
        difficulty_distr: Vec<f32>,
        loss_val_distr: Vec<f32>,
        loss_val_avg: f32,
    ) {
        self.val_epochs.push(epoch);
        self.loss_train.push(train_loss);
        self.difficulty_distr.push(difficulty_distr);
        self.loss_val_distr.push(loss_val_distr);
        self.loss_val_avg.push(loss_val_avg);
    }

    pub fn len(&self) -> usize {
        self.val_epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.val_epochs.is_empty()
    }

    /// Write `<category>.json` per column into `dir`.
    pub fn flush(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let categories = [
            ("val_epochs", serde_json::to_string_pretty(&self.val_epochs)?),
            ("loss_train", serde_json::to_string_pretty(&self.loss_train)?),
            ("loss_val_distr", serde_json::to_string_pretty(&self.loss_val_distr)?),
            ("loss_val_avg", serde_json::to_string_pretty(&self.loss_val_avg)?),
            ("difficulty_distr", serde_json::to_string_pretty(&self.difficulty_distr)?),
        ];
        let mut written = Vec::with_capacity(categories.len());
        for (name, json) in categories {
            let path = dir.join(format!("{name}.json"));
            std::fs::write(&path, json)?;
            written.push(path);
        }
        tracing::info!(dir = %dir.display(), entries = self.len(), "History saved");
        Ok(written)
    }
}
