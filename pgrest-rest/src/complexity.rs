//! Query cost estimation
//!
//! A request is scored before any SQL runs. Scores are a heuristic:
//!
//! - 1 per selected column, 5 per wildcard
//! - 10 x nesting level per embedded relationship
//! - 2 per filter condition (each OR branch counts)
//! - 1 per 100 rows of requested page size

use tracing::warn;

use pgrest_common::config::ComplexityConfig;
use pgrest_common::error::{Error, Result};

use crate::query::QueryParams;
use crate::select::{split_top_level, SelectField};

const WILDCARD_COST: u32 = 5;
const COLUMN_COST: u32 = 1;
const EMBED_COST: u32 = 10;
const FILTER_COST: u32 = 2;
const ROWS_PER_POINT: usize = 100;

/// Per-request cost estimate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryAnalysis {
    pub complexity_score: u32,
    /// Deepest relationship nesting (0 for a flat select)
    pub depth: u32,
    /// Total number of selected fields across all levels
    pub breadth: u32,
}

/// Rejects requests whose estimated cost exceeds the configured limits
#[derive(Debug, Clone)]
pub struct QueryComplexityAnalyzer {
    config: ComplexityConfig,
}

impl QueryComplexityAnalyzer {
    pub fn new(config: ComplexityConfig) -> Self {
        Self { config }
    }

    /// Score a request
    ///
    /// # Errors
    /// `InvalidQueryParam` when the page size parameters cannot be read.
    pub fn analyze(&self, fields: &[SelectField], params: &QueryParams) -> Result<QueryAnalysis> {
        let mut analysis = QueryAnalysis::default();
        score_fields(fields, 1, &mut analysis);

        for (key, values) in params.filters() {
            for value in values {
                let conditions = if key == "or" {
                    let inner = value.trim().trim_start_matches('(').trim_end_matches(')');
                    split_top_level(inner).len()
                } else {
                    1
                };
                analysis.complexity_score = analysis
                    .complexity_score
                    .saturating_add(FILTER_COST.saturating_mul(to_u32(conditions)));
            }
        }
        for (_, _, values) in params.embedded_filters() {
            analysis.complexity_score = analysis
                .complexity_score
                .saturating_add(FILTER_COST.saturating_mul(to_u32(values.len())));
        }

        let page = ["limit", "size", "first", "last"]
            .iter()
            .map(|k| params.usize_param(k))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(0);
        analysis.complexity_score = analysis
            .complexity_score
            .saturating_add(to_u32(page / ROWS_PER_POINT));

        Ok(analysis)
    }

    /// Enforce the limits. Failures while scoring let the request through.
    ///
    /// # Errors
    /// `QueryTooComplex` naming the first exceeded limit.
    pub fn check(&self, fields: &[SelectField], params: &QueryParams) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let analysis = match self.analyze(fields, params) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, "complexity analysis failed, allowing query");
                return Ok(());
            }
        };

        if analysis.depth > self.config.max_depth {
            return Err(Error::QueryTooComplex(format!(
                "embedding depth {} exceeds limit {}",
                analysis.depth, self.config.max_depth
            )));
        }
        if analysis.breadth > self.config.max_breadth {
            return Err(Error::QueryTooComplex(format!(
                "{} selected fields exceed limit {}",
                analysis.breadth, self.config.max_breadth
            )));
        }
        if analysis.complexity_score > self.config.max_score {
            return Err(Error::QueryTooComplex(format!(
                "complexity score {} exceeds limit {}",
                analysis.complexity_score, self.config.max_score
            )));
        }
        Ok(())
    }
}

fn score_fields(fields: &[SelectField], level: u32, analysis: &mut QueryAnalysis) {
    for field in fields {
        analysis.breadth = analysis.breadth.saturating_add(1);
        let cost = if field.is_wildcard() {
            WILDCARD_COST
        } else if field.is_embedded() {
            analysis.depth = analysis.depth.max(level);
            score_fields(field.children(), level + 1, analysis);
            EMBED_COST.saturating_mul(level)
        } else {
            COLUMN_COST
        };
        analysis.complexity_score = analysis.complexity_score.saturating_add(cost);
    }
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
