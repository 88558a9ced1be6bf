//! Request, reply and event types exchanged with an explorer client.
//!
//! Everything here is plain serde data. JSON field names are snake_case and
//! tagged unions carry their discriminator in a named field so replies can be
//! printed one per line by the CLI and parsed back by any client.

use serde::{Deserialize, Serialize};

/// Coarse, backend-independent classification of a column's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDisplayType {
    Boolean,
    Number,
    String,
    Date,
    Datetime,
    Time,
    Interval,
    Object,
    Array,
    Struct,
    Unknown,
}

impl ColumnDisplayType {
    pub const ALL: [ColumnDisplayType; 11] = [
        ColumnDisplayType::Boolean,
        ColumnDisplayType::Number,
        ColumnDisplayType::String,
        ColumnDisplayType::Date,
        ColumnDisplayType::Datetime,
        ColumnDisplayType::Time,
        ColumnDisplayType::Interval,
        ColumnDisplayType::Object,
        ColumnDisplayType::Array,
        ColumnDisplayType::Struct,
        ColumnDisplayType::Unknown,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub column_index: usize,
    pub column_name: String,
    /// Backend-specific type tag, e.g. `i64` or `object`.
    pub type_name: String,
    pub type_display: ColumnDisplayType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl ColumnSchema {
    /// Identity used when deciding whether a column changed underneath a filter.
    pub fn same_identity(&self, other: &ColumnSchema) -> bool {
        self.column_index == other.column_index
            && self.column_name == other.column_name
            && self.type_name == other.type_name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFilterCondition {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
}

impl CompareOp {
    pub fn holds(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ord == Equal,
            CompareOp::NotEq => ord != Equal,
            CompareOp::Lt => ord == Less,
            CompareOp::LtEq => ord != Greater,
            CompareOp::Gt => ord == Greater,
            CompareOp::GtEq => ord != Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSearchType {
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    RegexMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetweenParams {
    pub left_value: String,
    pub right_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareParams {
    pub op: CompareOp,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetMembershipParams {
    pub values: Vec<String>,
    pub inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSearchParams {
    pub search_type: TextSearchType,
    pub term: String,
    pub case_sensitive: bool,
}

/// The predicate a row filter applies. Filter values arrive as strings and are
/// coerced to the column's type during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter_type", content = "params", rename_all = "snake_case")]
pub enum RowFilterKind {
    Between(BetweenParams),
    NotBetween(BetweenParams),
    Compare(CompareParams),
    IsEmpty,
    NotEmpty,
    IsNull,
    NotNull,
    IsTrue,
    IsFalse,
    SetMembership(SetMembershipParams),
    Search(TextSearchParams),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFilterType {
    Between,
    NotBetween,
    Compare,
    IsEmpty,
    NotEmpty,
    IsNull,
    NotNull,
    IsTrue,
    IsFalse,
    SetMembership,
    Search,
}

impl RowFilterType {
    pub const ALL: [RowFilterType; 11] = [
        RowFilterType::Between,
        RowFilterType::NotBetween,
        RowFilterType::Compare,
        RowFilterType::IsEmpty,
        RowFilterType::NotEmpty,
        RowFilterType::IsNull,
        RowFilterType::NotNull,
        RowFilterType::IsTrue,
        RowFilterType::IsFalse,
        RowFilterType::SetMembership,
        RowFilterType::Search,
    ];
}

impl RowFilterKind {
    pub fn filter_type(&self) -> RowFilterType {
        match self {
            RowFilterKind::Between(_) => RowFilterType::Between,
            RowFilterKind::NotBetween(_) => RowFilterType::NotBetween,
            RowFilterKind::Compare(_) => RowFilterType::Compare,
            RowFilterKind::IsEmpty => RowFilterType::IsEmpty,
            RowFilterKind::NotEmpty => RowFilterType::NotEmpty,
            RowFilterKind::IsNull => RowFilterType::IsNull,
            RowFilterKind::NotNull => RowFilterType::NotNull,
            RowFilterKind::IsTrue => RowFilterType::IsTrue,
            RowFilterKind::IsFalse => RowFilterType::IsFalse,
            RowFilterKind::SetMembership(_) => RowFilterType::SetMembership,
            RowFilterKind::Search(_) => RowFilterType::Search,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    pub filter_id: String,
    pub column_schema: ColumnSchema,
    #[serde(default)]
    pub condition: RowFilterCondition,
    /// Set during evaluation; `false` when the filter was skipped or failed.
    #[serde(default = "default_true")]
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub kind: RowFilterKind,
}

impl RowFilter {
    pub fn new(filter_id: impl Into<String>, column_schema: ColumnSchema, kind: RowFilterKind) -> Self {
        Self {
            filter_id: filter_id.into(),
            column_schema,
            condition: RowFilterCondition::And,
            is_valid: true,
            error_message: None,
            kind,
        }
    }

    pub fn with_condition(mut self, condition: RowFilterCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn filter_type(&self) -> RowFilterType {
        self.kind.filter_type()
    }

    pub(crate) fn invalidate(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.error_message = Some(message.into());
    }

    pub(crate) fn mark_valid(&mut self) {
        self.is_valid = true;
        self.error_message = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSortKey {
    pub column_index: usize,
    pub ascending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterResult {
    pub selected_num_rows: usize,
    pub had_errors: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOptions {
    pub large_num_digits: usize,
    pub small_num_digits: usize,
    pub max_integral_digits: usize,
    pub max_value_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thousands_sep: Option<String>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            large_num_digits: 2,
            small_num_digits: 4,
            max_integral_digits: 7,
            max_value_length: 1000,
            thousands_sep: None,
        }
    }
}

/// Codes sent in place of a formatted string for values with no printable form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialValue {
    Null,
    NA,
    NaN,
    NaT,
    None,
    Inf,
    NegInf,
}

impl SpecialValue {
    pub fn code(self) -> i64 {
        match self {
            SpecialValue::Null => 0,
            SpecialValue::NA => 1,
            SpecialValue::NaN => 2,
            SpecialValue::NaT => 3,
            SpecialValue::None => 4,
            SpecialValue::Inf => 10,
            SpecialValue::NegInf => 11,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Special(i64),
    Formatted(String),
}

impl From<SpecialValue> for ColumnValue {
    fn from(v: SpecialValue) -> Self {
        ColumnValue::Special(v.code())
    }
}

/// Row positions within the visible (filtered and sorted) view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArraySelection {
    /// Inclusive on both ends.
    Range { first_index: i64, last_index: i64 },
    Indices { indices: Vec<i64> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub column_index: i64,
    pub spec: ArraySelection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<Vec<ColumnValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRowLabels {
    pub row_labels: Vec<Vec<ColumnValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSelectionSingleCell {
    pub row_index: i64,
    pub column_index: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSelectionCellRange {
    pub first_row_index: i64,
    pub last_row_index: i64,
    pub first_column_index: i64,
    pub last_column_index: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSelectionCellIndices {
    pub row_indices: Vec<i64>,
    pub column_indices: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSelectionRange {
    pub first_index: i64,
    pub last_index: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSelectionIndices {
    pub indices: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "selection", rename_all = "snake_case")]
pub enum TableSelection {
    SingleCell(DataSelectionSingleCell),
    CellRange(DataSelectionCellRange),
    CellIndices(DataSelectionCellIndices),
    RowRange(DataSelectionRange),
    ColumnRange(DataSelectionRange),
    RowIndices(DataSelectionIndices),
    ColumnIndices(DataSelectionIndices),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Tsv,
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedData {
    pub data: String,
    pub format: ExportFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDataTypesParams {
    pub display_types: Vec<ColumnDisplayType>,
}

/// Column-level filter used by schema search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter_type", content = "params", rename_all = "snake_case")]
pub enum ColumnFilter {
    TextSearch(TextSearchParams),
    MatchDataTypes(MatchDataTypesParams),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSchemaSortOrder {
    #[default]
    Original,
    AscendingName,
    DescendingName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSchemaResult {
    /// Matching column indices in the requested order.
    pub matches: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnProfileType {
    NullCount,
    SummaryStats,
    SmallHistogram,
    LargeHistogram,
    SmallFrequencyTable,
    LargeFrequencyTable,
}

impl ColumnProfileType {
    pub const ALL: [ColumnProfileType; 6] = [
        ColumnProfileType::NullCount,
        ColumnProfileType::SummaryStats,
        ColumnProfileType::SmallHistogram,
        ColumnProfileType::LargeHistogram,
        ColumnProfileType::SmallFrequencyTable,
        ColumnProfileType::LargeFrequencyTable,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnHistogramMethod {
    Fixed,
    Sturges,
    FreedmanDiaconis,
    Scott,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnHistogramParams {
    pub method: ColumnHistogramMethod,
    /// Bin count for `Fixed`; the upper bound for every other method.
    pub num_bins: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantiles: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFrequencyTableParams {
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnProfileParams {
    Histogram(ColumnHistogramParams),
    FrequencyTable(ColumnFrequencyTableParams),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfileSpec {
    pub profile_type: ColumnProfileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<ColumnProfileParams>,
}

impl ColumnProfileSpec {
    pub fn new(profile_type: ColumnProfileType) -> Self {
        Self {
            profile_type,
            params: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfileRequest {
    pub column_index: i64,
    pub profiles: Vec<ColumnProfileSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnQuantileValue {
    pub q: f64,
    pub value: String,
    pub exact: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnHistogram {
    pub bin_edges: Vec<String>,
    pub bin_counts: Vec<u64>,
    #[serde(default)]
    pub quantiles: Vec<ColumnQuantileValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFrequencyTable {
    pub values: Vec<ColumnValue>,
    pub counts: Vec<u64>,
    /// Rows whose value fell outside the top groups.
    pub other_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStatsNumber {
    pub min_value: Option<String>,
    pub max_value: Option<String>,
    pub mean: Option<String>,
    pub median: Option<String>,
    pub stdev: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStatsString {
    pub num_empty: u64,
    pub num_unique: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStatsBoolean {
    pub true_count: u64,
    pub false_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStatsDate {
    pub num_unique: Option<u64>,
    pub min_date: Option<String>,
    pub mean_date: Option<String>,
    pub median_date: Option<String>,
    pub max_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStatsDatetime {
    pub num_unique: Option<u64>,
    pub min_date: Option<String>,
    pub mean_date: Option<String>,
    pub median_date: Option<String>,
    pub max_date: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStatsOther {
    pub num_unique: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSummaryStats {
    pub type_display: ColumnDisplayType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_stats: Option<SummaryStatsNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_stats: Option<SummaryStatsString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean_stats: Option<SummaryStatsBoolean>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_stats: Option<SummaryStatsDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime_stats: Option<SummaryStatsDatetime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_stats: Option<SummaryStatsOther>,
}

impl ColumnSummaryStats {
    pub fn empty(type_display: ColumnDisplayType) -> Self {
        Self {
            type_display,
            number_stats: None,
            string_stats: None,
            boolean_stats: None,
            date_stats: None,
            datetime_stats: None,
            other_stats: None,
        }
    }
}

/// One entry per requested profile spec; a failed spec leaves its field empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfileResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_stats: Option<ColumnSummaryStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_histogram: Option<ColumnHistogram>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_histogram: Option<ColumnHistogram>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_frequency_table: Option<ColumnFrequencyTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_frequency_table: Option<ColumnFrequencyTable>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableShape {
    pub num_rows: usize,
    pub num_columns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSupport {
    pub type_display: ColumnDisplayType,
    pub row_filters: Vec<RowFilterType>,
    pub profiles: Vec<ColumnProfileType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedFeatures {
    pub search_schema: bool,
    pub set_sort_columns: bool,
    pub row_filter_conditions: bool,
    pub row_filter_types: Vec<RowFilterType>,
    pub column_profile_types: Vec<ColumnProfileType>,
    pub export_formats: Vec<ExportFormat>,
    pub type_support: Vec<TypeSupport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendState {
    pub display_name: String,
    pub table_shape: TableShape,
    pub table_unfiltered_shape: TableShape,
    pub has_row_labels: bool,
    /// Column-level filters applied to the view. Always empty: column
    /// filtering is reserved and never populated.
    pub column_filters: Vec<ColumnFilter>,
    pub row_filters: Vec<RowFilter>,
    pub sort_keys: Vec<ColumnSortKey>,
    pub supported_features: SupportedFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum ExplorerRequest {
    GetSchema {
        column_indices: Vec<i64>,
    },
    SearchSchema {
        filters: Vec<ColumnFilter>,
        #[serde(default)]
        sort_order: SearchSchemaSortOrder,
    },
    SetRowFilters {
        filters: Vec<RowFilter>,
    },
    SetSortColumns {
        sort_keys: Vec<ColumnSortKey>,
    },
    GetDataValues {
        columns: Vec<ColumnSelection>,
        #[serde(default)]
        format_options: Option<FormatOptions>,
    },
    GetRowLabels {
        selection: ArraySelection,
        #[serde(default)]
        format_options: Option<FormatOptions>,
    },
    ExportDataSelection {
        selection: TableSelection,
        format: ExportFormat,
    },
    GetColumnProfiles {
        callback_id: String,
        profiles: Vec<ColumnProfileRequest>,
        #[serde(default)]
        format_options: Option<FormatOptions>,
    },
    GetState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "result", rename_all = "snake_case")]
pub enum ExplorerReply {
    GetSchema(TableSchema),
    SearchSchema(SearchSchemaResult),
    SetRowFilters(FilterResult),
    SetSortColumns,
    GetDataValues(TableData),
    GetRowLabels(TableRowLabels),
    ExportDataSelection(ExportedData),
    /// Acknowledgment only; profiles arrive later as an event.
    GetColumnProfiles,
    GetState(BackendState),
}

/// Notifications emitted by an explorer outside of request/reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExplorerEvent {
    /// Column set or types changed; clients should refetch the schema.
    SchemaUpdate,
    /// Same schema, new values.
    DataUpdate,
    ColumnProfilesReady {
        callback_id: String,
        profiles: Vec<ColumnProfileResult>,
    },
}
