//! PostgREST-style REST layer over relational tables
//!
//! Translates query-string requests into parameterized SQL and converts
//! results to JSON, supporting:
//! - CRUD operations on tables, single and composite keys
//! - Filtering (eq, neq, gt, gte, lt, lte, like, ilike, in, is, JSON, array
//!   and full-text operators), OR groups and negation
//! - Ordering, offset and cursor pagination
//! - Batched nested resource expansion
//! - Query complexity limits and constraint error mapping

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod builder;
pub mod complexity;
pub mod constraint;
pub mod convert;
pub mod expand;
pub mod filter;
pub mod handlers;
pub mod query;
pub mod schema;
pub mod select;
pub mod server;
pub mod service;
pub mod validation;

pub use backend::{RecordingExecutor, Row, SqlExecutor, SqlValue, Statement};
pub use builder::QueryBuilder;
pub use complexity::{QueryAnalysis, QueryComplexityAnalyzer};
pub use convert::TypeConverter;
pub use expand::RelationshipExpander;
pub use filter::{FilterOperator, FilterParser, WhereClause};
pub use query::QueryParams;
pub use schema::{SchemaCache, SchemaLoader, SchemaProvider, SchemaSnapshot};
pub use select::{parse_select, SelectField};
pub use server::RestServer;
pub use service::RestService;
