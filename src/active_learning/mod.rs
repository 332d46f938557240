//! # Active learning
//!
//! An [`ActiveLearner`] helps a user label a working sample for a binary concept
//! described by a query vector. It starts in *query mode*, proposing the sample items
//! most and least similar to the query until enough positive and negative labels exist,
//! then switches to *SVM mode*, where it proposes the unlabeled item closest to the
//! decision boundary of an SVM trained on the labels gathered so far.

use anyhow::bail;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::dataset::FeatureMatrix;
use crate::error::{check_index, LinalgError};
use crate::similarity::{rank_by_similarity, CosineSimilarity};
use crate::sparse::{SparseMatrix, SparseVector};
use crate::svm::{Svc, SvcParams};
use crate::utils::sort_permutation;

/// Turns a record of an external store into a sparse feature vector.
pub trait FeatureExtractor {
    /// Dimension of the produced vectors.
    fn dim(&self) -> usize;

    fn extract(&self, record: usize) -> anyhow::Result<SparseVector>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveLearnerSettings {
    /// Positive labels needed before leaving query mode.
    pub n_pos: usize,
    /// Negative labels needed before leaving query mode.
    pub n_neg: usize,
    pub svc: SvcParams,
    /// Build the working sample through a [`FeatureExtractor`] instead of taking a ready
    /// feature matrix.
    pub extract_features: bool,
}

impl Default for ActiveLearnerSettings {
    fn default() -> Self {
        Self {
            n_pos: 2,
            n_neg: 2,
            svc: SvcParams::default(),
            extract_features: false,
        }
    }
}

impl ActiveLearnerSettings {
    pub fn with_n_pos(mut self, n_pos: usize) -> Self {
        self.n_pos = n_pos;
        self
    }

    pub fn with_n_neg(mut self, n_neg: usize) -> Self {
        self.n_neg = n_neg;
        self
    }

    pub fn with_svc(mut self, svc: SvcParams) -> Self {
        self.svc = svc;
        self
    }

    pub fn with_extract_features(mut self, extract_features: bool) -> Self {
        self.extract_features = extract_features;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveLearner {
    settings: ActiveLearnerSettings,
    query: SparseVector,
    sample: SparseMatrix,
    /// Sample indices by decreasing cosine similarity to the query.
    ranking: Vec<usize>,
    labels: Vec<Option<f64>>,
    /// Labeled sample indices in answer order.
    answered: Vec<usize>,
    n_pos: usize,
    n_neg: usize,
    ask_positive: bool,
    svc: Svc,
    stale: bool,
}

impl ActiveLearner {
    /// Starts a session.
    ///
    /// With `extract_features` disabled the working sample is `sample`, one column per
    /// item. With it enabled the sample is built by running `extractor` over `records`.
    /// Missing inputs for the chosen mode are rejected before any work is done.
    pub fn new(
        settings: ActiveLearnerSettings,
        query: SparseVector,
        sample: Option<SparseMatrix>,
        extractor: Option<&dyn FeatureExtractor>,
        records: &[usize],
    ) -> anyhow::Result<Self> {
        if settings.n_pos == 0 || settings.n_neg == 0 {
            bail!(LinalgError::InvalidConfiguration(
                "n_pos and n_neg must be positive".to_string()
            ));
        }
        let svc = Svc::new(settings.svc)?;
        let sample = if settings.extract_features {
            let extractor = extractor.ok_or_else(|| {
                LinalgError::InvalidConfiguration(
                    "extract_features requires a feature extractor".to_string(),
                )
            })?;
            let mut sample = SparseMatrix::with_rows(extractor.dim());
            for &record in records {
                sample.push(extractor.extract(record)?)?;
            }
            sample
        } else {
            sample.ok_or_else(|| {
                LinalgError::InvalidConfiguration(
                    "a sample matrix is required when extract_features is disabled".to_string(),
                )
            })?
        };

        let ranking = rank_by_similarity(
            &CosineSimilarity,
            &(&query).into(),
            FeatureMatrix::Sparse(&sample),
        );
        debug!("active learner: ranked {} sample items", ranking.len());
        Ok(Self {
            settings,
            query,
            labels: vec![None; sample.cols()],
            sample,
            ranking,
            answered: Vec::new(),
            n_pos: 0,
            n_neg: 0,
            ask_positive: true,
            svc,
            stale: false,
        })
    }

    pub fn settings(&self) -> &ActiveLearnerSettings {
        &self.settings
    }

    pub fn query(&self) -> &SparseVector {
        &self.query
    }

    pub fn sample(&self) -> &SparseMatrix {
        &self.sample
    }

    pub fn get_n_pos(&self) -> usize {
        self.n_pos
    }

    pub fn get_n_neg(&self) -> usize {
        self.n_neg
    }

    /// `true` until both label quotas are met.
    pub fn get_query_mode(&self) -> bool {
        self.n_pos < self.settings.n_pos || self.n_neg < self.settings.n_neg
    }

    /// Labeled items as `(sample index, label)` in answer order.
    pub fn labeled(&self) -> Vec<(usize, f64)> {
        self.answered
            .iter()
            .filter_map(|&i| self.labels[i].map(|label| (i, label)))
            .collect()
    }

    /// Model trained on the labels as of the last question in SVM mode.
    pub fn svc(&self) -> &Svc {
        &self.svc
    }

    /// Next sample index to label, or `None` once every item has a label.
    pub fn select_question(&mut self) -> anyhow::Result<Option<usize>> {
        if self.answered.len() == self.labels.len() {
            return Ok(None);
        }
        if self.get_query_mode() {
            let need_pos = self.n_pos < self.settings.n_pos;
            let need_neg = self.n_neg < self.settings.n_neg;
            let positive = need_pos && (!need_neg || self.ask_positive);
            self.ask_positive = !self.ask_positive;
            let mut unlabeled = self.ranking.iter().filter(|&&i| self.labels[i].is_none());
            let pick = if positive {
                unlabeled.next()
            } else {
                unlabeled.next_back()
            };
            return Ok(pick.copied());
        }

        self.retrain()?;
        let mut best: Option<(usize, f64)> = None;
        for (i, label) in self.labels.iter().enumerate() {
            if label.is_some() {
                continue;
            }
            let margin = self
                .svc
                .decision_function(self.sample.get_col(i)?.into())?
                .abs();
            if best.map_or(true, |(_, m)| margin < m) {
                best = Some((i, margin));
            }
        }
        Ok(best.map(|(i, _)| i))
    }

    /// Records the user's answer for sample item `idx`. `label` must be `1` or `-1`.
    /// The model is retrained lazily by the next [`ActiveLearner::select_question`].
    pub fn get_answer(&mut self, label: f64, idx: usize) -> anyhow::Result<&mut Self> {
        check_index(idx, self.labels.len())?;
        if label != 1.0 && label != -1.0 {
            bail!(LinalgError::InvalidArgument(format!(
                "label must be 1 or -1, got {label}"
            )));
        }
        if self.labels[idx].is_some() {
            bail!(LinalgError::InvalidArgument(format!(
                "sample item {idx} is already labeled"
            )));
        }
        let was_query_mode = self.get_query_mode();
        self.labels[idx] = Some(label);
        self.answered.push(idx);
        if label > 0.0 {
            self.n_pos += 1;
        } else {
            self.n_neg += 1;
        }
        self.stale = true;
        if was_query_mode && !self.get_query_mode() {
            debug!(
                "active learner: switching to SVM mode with {} positive and {} negative labels",
                self.n_pos, self.n_neg
            );
        }
        Ok(self)
    }

    /// Sample indices whose margin exceeds `threshold`, highest margin first. Only
    /// available in SVM mode.
    pub fn get_positives(&mut self, threshold: f64) -> anyhow::Result<Vec<usize>> {
        if self.get_query_mode() {
            bail!(LinalgError::NotFitted("ActiveLearner"));
        }
        self.retrain()?;
        let margins = self
            .svc
            .predict_matrix(FeatureMatrix::Sparse(&self.sample))?;
        Ok(sort_permutation(margins.as_slice(), false)
            .into_iter()
            .filter(|&i| margins[i] > threshold)
            .collect())
    }

    fn retrain(&mut self) -> anyhow::Result<()> {
        if !self.stale {
            return Ok(());
        }
        let (indices, targets): (Vec<usize>, Vec<f64>) = self.labeled().into_iter().unzip();
        let mut features = self.sample.get_col_subset(&indices)?;
        features.set_rows(self.sample.rows())?;
        let mut svc = self.svc.clone();
        svc.fit(FeatureMatrix::Sparse(&features), &targets.into())?;
        self.svc = svc;
        self.stale = false;
        debug!("active learner: retrained on {} labels", indices.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::Matrix;
    use crate::utils::Persist;
    use std::io::BufReader;

    fn sample() -> SparseMatrix {
        Matrix::from_rows(&[
            vec![1.0, 0.9, 0.5, 0.1, 0.0, -1.0],
            vec![0.0, 0.1, 0.5, 0.9, 1.0, 0.0],
        ])
        .unwrap()
        .sparse()
    }

    fn query() -> SparseVector {
        SparseVector::new(vec![(0, 1.0)], Some(2)).unwrap()
    }

    fn learner() -> ActiveLearner {
        let settings =
            ActiveLearnerSettings::default().with_svc(SvcParams::default().with_max_time(60.0));
        ActiveLearner::new(settings, query(), Some(sample()), None, &[]).unwrap()
    }

    #[test]
    fn test_query_mode_alternates_then_switches() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut al = learner();
        assert!(al.get_query_mode());

        let expected = [(0, 1.0), (5, -1.0), (1, 1.0), (4, -1.0)];
        for (idx, label) in expected {
            assert_eq!(al.select_question().unwrap(), Some(idx));
            al.get_answer(label, idx).unwrap();
        }
        assert!(!al.get_query_mode());
        assert_eq!((al.get_n_pos(), al.get_n_neg()), (2, 2));

        let next = al.select_question().unwrap().unwrap();
        assert!(next == 2 || next == 3);
        let margin = |i: usize| {
            al.svc()
                .decision_function(al.sample().get_col(i).unwrap().into())
                .unwrap()
                .abs()
        };
        let other = if next == 2 { 3 } else { 2 };
        assert!(margin(next) <= margin(other));
    }

    #[test]
    fn test_only_missing_side_is_asked() {
        let settings = ActiveLearnerSettings::default().with_n_pos(1).with_n_neg(3);
        let mut al = ActiveLearner::new(settings, query(), Some(sample()), None, &[]).unwrap();
        assert_eq!(al.select_question().unwrap(), Some(0));
        al.get_answer(1.0, 0).unwrap();
        // Positives are satisfied, so every further question is a least-similar item.
        assert_eq!(al.select_question().unwrap(), Some(5));
        al.get_answer(-1.0, 5).unwrap();
        assert_eq!(al.select_question().unwrap(), Some(4));
    }

    #[test]
    fn test_answers_are_validated_and_lazy() {
        let mut al = learner();
        let before = al.clone();
        assert!(al.get_answer(0.5, 0).is_err());
        assert!(al.get_answer(1.0, 6).is_err());
        assert_eq!(al, before);

        al.get_answer(1.0, 0).unwrap();
        assert!(al.get_answer(-1.0, 0).is_err());
        assert_eq!(al.labeled(), vec![(0, 1.0)]);
        // No retraining happens on answer.
        assert!(al.svc().weights().is_err());
        assert!(al.get_positives(0.0).is_err());
    }

    #[test]
    fn test_everything_labeled() {
        let mut al = learner();
        let labels = [1.0, 1.0, 1.0, -1.0, -1.0, -1.0];
        for (idx, label) in labels.into_iter().enumerate() {
            al.get_answer(label, idx).unwrap();
        }
        assert_eq!(al.select_question().unwrap(), None);

        let positives = al.get_positives(0.0).unwrap();
        assert!(positives.contains(&0));
        assert!(!positives.contains(&5));
        let margins = al
            .svc()
            .predict_matrix(FeatureMatrix::Sparse(al.sample()))
            .unwrap();
        for pair in positives.windows(2) {
            assert!(margins[pair[0]] >= margins[pair[1]]);
        }
    }

    #[test]
    fn test_invalid_configuration() {
        let err = ActiveLearner::new(ActiveLearnerSettings::default(), query(), None, None, &[])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LinalgError>(),
            Some(LinalgError::InvalidConfiguration(_))
        ));
        let extracting = ActiveLearnerSettings::default().with_extract_features(true);
        assert!(ActiveLearner::new(extracting, query(), Some(sample()), None, &[]).is_err());
        let zero = ActiveLearnerSettings::default().with_n_neg(0);
        assert!(ActiveLearner::new(zero, query(), Some(sample()), None, &[]).is_err());
    }

    struct Parity;

    impl FeatureExtractor for Parity {
        fn dim(&self) -> usize {
            2
        }

        fn extract(&self, record: usize) -> anyhow::Result<SparseVector> {
            SparseVector::new(vec![(record % 2, 1.0)], Some(2))
        }
    }

    #[test]
    fn test_feature_extraction() {
        let settings = ActiveLearnerSettings::default().with_extract_features(true);
        let mut al =
            ActiveLearner::new(settings, query(), None, Some(&Parity), &[3, 4, 7, 10]).unwrap();
        assert_eq!(al.sample().cols(), 4);
        // Records 4 and 10 are even and match the query exactly.
        assert_eq!(al.select_question().unwrap(), Some(1));
        assert_eq!(al.select_question().unwrap(), Some(2));
    }

    #[test]
    fn test_save_load() {
        let mut al = learner();
        al.get_answer(1.0, 0).unwrap();
        let mut buffer = Vec::new();
        al.save(&mut buffer).unwrap();
        let loaded = ActiveLearner::load(BufReader::new(buffer.as_slice())).unwrap();
        assert_eq!(loaded, al);
    }
}
