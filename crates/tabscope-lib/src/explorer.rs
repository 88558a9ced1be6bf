//! One open view over a table: filters, sort keys, cached indices and the
//! request surface clients talk to.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::TableBackend;
use crate::comm::{
    ArraySelection, BackendState, ColumnFilter, ColumnProfileRequest, ColumnProfileResult,
    ColumnSchema, ColumnSelection, ColumnSortKey, ExplorerEvent, ExplorerReply, ExplorerRequest,
    ExportFormat, ExportedData, FilterResult, FormatOptions, RowFilter, SearchSchemaResult,
    SearchSchemaSortOrder, TableData, TableRowLabels, TableSchema, TableSelection, TableShape,
};
use crate::config::AppConfig;
use crate::error::{ExplorerError, ExplorerResult};
use crate::export::export_selection;
use crate::features::supported_features;
use crate::format::{format_value, format_values};
use crate::profile::ProfileDefaults;
use crate::reconcile::reconcile;
use crate::scalar::Scalar;
use crate::schema::{self, column_schema, prepare_schema_cache, SchemaCacheLimits};
use crate::state::DataExplorerState;
use crate::view::ViewIndices;
use crate::worker::{ColumnJob, ProfileJob, ProfileWorker};

/// Tunables for one explorer, usually taken from [`AppConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplorerConfig {
    pub schema_limits: SchemaCacheLimits,
    pub profile_defaults: ProfileDefaults,
    pub format_options: FormatOptions,
}

impl From<&AppConfig> for ExplorerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            schema_limits: config.schema_limits(),
            profile_defaults: config.profile_defaults(),
            format_options: config.format_options(),
        }
    }
}

#[derive(Debug)]
pub struct DataExplorer {
    display_name: String,
    backend: Arc<dyn TableBackend>,
    config: ExplorerConfig,
    state: DataExplorerState,
    view: ViewIndices,
    events: Sender<ExplorerEvent>,
    worker: Option<ProfileWorker>,
}

impl DataExplorer {
    pub fn new(
        display_name: impl Into<String>,
        backend: Arc<dyn TableBackend>,
        config: ExplorerConfig,
        events: Sender<ExplorerEvent>,
    ) -> ExplorerResult<Self> {
        let display_name = display_name.into();
        let mut state = DataExplorerState::new();
        prepare_schema_cache(backend.as_ref(), &mut state, &config.schema_limits)?;
        let worker = match ProfileWorker::spawn(events.clone()) {
            Ok(worker) => Some(worker),
            Err(err) => {
                warn!(error = %err, "could not start profile worker; profiles will run inline");
                None
            }
        };
        let mut view = ViewIndices::new();
        view.invalidate();
        info!(
            name = %display_name,
            kind = %backend.kind(),
            rows = backend.num_rows(),
            columns = backend.num_columns(),
            "opened table view"
        );
        Ok(Self {
            display_name,
            backend,
            config,
            state,
            view,
            events,
            worker,
        })
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn backend(&self) -> &Arc<dyn TableBackend> {
        &self.backend
    }

    pub fn state(&self) -> &DataExplorerState {
        &self.state
    }

    /// Ascending rows passing the current filters; `None` means every row.
    pub fn filtered_indices(&mut self) -> ExplorerResult<Option<&[usize]>> {
        self.refresh()?;
        Ok(self.view.filtered_indices())
    }

    /// Filtered rows in sort order; `None` when no sort keys are set.
    pub fn row_view_indices(&mut self) -> ExplorerResult<Option<&[usize]>> {
        self.refresh()?;
        Ok(self.view.row_view_indices())
    }

    fn refresh(&mut self) -> ExplorerResult<()> {
        self.view
            .recompute_if_needed(self.backend.as_ref(), &mut self.state)
    }

    pub fn get_schema(&mut self, column_indices: &[i64]) -> ExplorerResult<TableSchema> {
        let columns = schema::get_schema(self.backend.as_ref(), &mut self.state, column_indices)?;
        Ok(TableSchema { columns })
    }

    pub fn search_schema(
        &mut self,
        filters: &[ColumnFilter],
        sort_order: SearchSchemaSortOrder,
    ) -> ExplorerResult<SearchSchemaResult> {
        let matches =
            schema::search_schema(self.backend.as_ref(), &mut self.state, filters, sort_order)?;
        Ok(SearchSchemaResult { matches })
    }

    /// Replace the row filters and apply them now. Filter failures are
    /// recorded on the filters, not returned as errors. If the filters cannot
    /// be applied at all, the previous filters stay in place.
    pub fn set_row_filters(&mut self, filters: Vec<RowFilter>) -> ExplorerResult<FilterResult> {
        let previous = std::mem::replace(&mut self.state.row_filters, filters);
        let result = match self
            .view
            .apply_filters(self.backend.as_ref(), &mut self.state)
        {
            Ok(result) => result,
            Err(err) => {
                self.state.row_filters = previous;
                return Err(err);
            }
        };
        info!(
            filters = self.state.row_filters.len(),
            selected = result.selected_num_rows,
            had_errors = result.had_errors,
            "row filters set"
        );
        Ok(result)
    }

    /// Replace the sort keys. The first key is the primary key.
    pub fn set_sort_columns(&mut self, sort_keys: Vec<ColumnSortKey>) -> ExplorerResult<()> {
        let num_columns = self.backend.num_columns();
        if let Some(bad) = sort_keys.iter().find(|k| k.column_index >= num_columns) {
            return Err(ExplorerError::IndexError(format!(
                "sort column {} is out of range for {} columns",
                bad.column_index, num_columns
            )));
        }
        debug!(keys = sort_keys.len(), "sort keys set");
        self.state.sort_keys = sort_keys;
        self.view.mark_sort_dirty();
        Ok(())
    }

    fn visible_rows_for(&self, selection: &ArraySelection) -> ExplorerResult<Vec<usize>> {
        match selection {
            ArraySelection::Range {
                first_index,
                last_index,
            } => self
                .view
                .rows_in_range(self.backend.as_ref(), *first_index, *last_index),
            ArraySelection::Indices { indices } => {
                self.view.rows_at(self.backend.as_ref(), indices)
            }
        }
    }

    fn column_position(&self, column_index: i64) -> ExplorerResult<usize> {
        let num_columns = self.backend.num_columns();
        if column_index < 0 || column_index as usize >= num_columns {
            return Err(ExplorerError::IndexError(format!(
                "column index {} is out of range for {} columns",
                column_index, num_columns
            )));
        }
        Ok(column_index as usize)
    }

    /// Formatted values for each selection, addressed by visible row position.
    pub fn get_data_values(
        &mut self,
        columns: &[ColumnSelection],
        format_options: Option<&FormatOptions>,
    ) -> ExplorerResult<TableData> {
        self.refresh()?;
        let opts = format_options.unwrap_or(&self.config.format_options);
        let mut out = Vec::with_capacity(columns.len());
        for selection in columns {
            let column = self.column_position(selection.column_index)?;
            let rows = self.visible_rows_for(&selection.spec)?;
            let cells = self.backend.gather(column, Some(&rows))?;
            out.push(format_values(&cells, opts));
        }
        Ok(TableData { columns: out })
    }

    pub fn get_row_labels(
        &mut self,
        selection: &ArraySelection,
        format_options: Option<&FormatOptions>,
    ) -> ExplorerResult<TableRowLabels> {
        if !self.backend.has_row_labels() {
            return Err(ExplorerError::NotImplemented(
                "this table has no row labels".to_string(),
            ));
        }
        self.refresh()?;
        let opts = format_options.unwrap_or(&self.config.format_options);
        let rows = self.visible_rows_for(selection)?;
        let labels = self
            .backend
            .row_labels(&rows)?
            .into_iter()
            .map(|label| format_value(&Scalar::Str(label), opts))
            .collect();
        Ok(TableRowLabels {
            row_labels: vec![labels],
        })
    }

    pub fn export_data_selection(
        &mut self,
        selection: &TableSelection,
        format: ExportFormat,
    ) -> ExplorerResult<ExportedData> {
        self.refresh()?;
        export_selection(self.backend.as_ref(), &self.view, selection, format)
    }

    /// Snapshot a profile job over the current filtered rows.
    fn profile_job(
        &mut self,
        callback_id: String,
        requests: &[ColumnProfileRequest],
        format_options: Option<&FormatOptions>,
    ) -> ExplorerResult<ProfileJob> {
        self.refresh()?;
        let num_columns = self.backend.num_columns();
        let mut columns = Vec::with_capacity(requests.len());
        for request in requests {
            if request.column_index < 0 {
                return Err(ExplorerError::IndexError(format!(
                    "column index {} is negative",
                    request.column_index
                )));
            }
            let index = request.column_index as usize;
            let schema: Option<ColumnSchema> = if index < num_columns {
                Some(column_schema(self.backend.as_ref(), &mut self.state, index)?)
            } else {
                None
            };
            columns.push(ColumnJob {
                schema,
                specs: request.profiles.clone(),
            });
        }
        Ok(ProfileJob {
            callback_id,
            backend: Arc::clone(&self.backend),
            rows: self.view.filtered_indices().map(|rows| Arc::new(rows.to_vec())),
            columns,
            format_options: format_options
                .cloned()
                .unwrap_or_else(|| self.config.format_options.clone()),
            defaults: self.config.profile_defaults.clone(),
        })
    }

    /// Queue profiles for background computation. Results arrive as
    /// [`ExplorerEvent::ColumnProfilesReady`] carrying `callback_id`.
    pub fn get_column_profiles(
        &mut self,
        callback_id: impl Into<String>,
        requests: &[ColumnProfileRequest],
        format_options: Option<&FormatOptions>,
    ) -> ExplorerResult<()> {
        let job = self.profile_job(callback_id.into(), requests, format_options)?;
        debug!(callback_id = %job.callback_id, columns = job.columns.len(), "queueing profiles");
        let job = match &self.worker {
            Some(worker) => match worker.submit(job) {
                Ok(()) => return Ok(()),
                Err(job) => job,
            },
            None => job,
        };
        warn!("profile worker unavailable; computing profiles inline");
        if self.events.send(job.into_event()).is_err() {
            debug!("event receiver gone; dropping profile results");
        }
        Ok(())
    }

    /// Compute profiles on the calling thread.
    pub fn compute_column_profiles(
        &mut self,
        requests: &[ColumnProfileRequest],
        format_options: Option<&FormatOptions>,
    ) -> ExplorerResult<Vec<ColumnProfileResult>> {
        Ok(self
            .profile_job(String::new(), requests, format_options)?
            .run())
    }

    pub fn get_state(&mut self) -> ExplorerResult<BackendState> {
        self.refresh()?;
        let num_columns = self.backend.num_columns();
        Ok(BackendState {
            display_name: self.display_name.clone(),
            table_shape: TableShape {
                num_rows: self.view.num_visible_rows(self.backend.as_ref()),
                num_columns,
            },
            table_unfiltered_shape: TableShape {
                num_rows: self.backend.num_rows(),
                num_columns,
            },
            has_row_labels: self.backend.has_row_labels(),
            column_filters: Vec::new(),
            row_filters: self.state.row_filters.clone(),
            sort_keys: self.state.sort_keys.clone(),
            supported_features: supported_features(),
        })
    }

    /// Swap in a new table, carrying filters and sort keys over by column
    /// name. Returns whether the schema changed and emits the matching event.
    pub fn notify_table_replaced(&mut self, backend: Arc<dyn TableBackend>) -> bool {
        let old_state = std::mem::take(&mut self.state);
        let reconciled = reconcile(
            old_state,
            self.backend.as_ref(),
            backend.as_ref(),
            &self.config.schema_limits,
        );
        self.backend = backend;
        self.state = reconciled.state;
        self.view.invalidate();
        if let Err(err) = self.view.apply_filters(self.backend.as_ref(), &mut self.state) {
            warn!(error = %err, "could not re-apply filters to replacement table");
            self.view.invalidate();
        }

        info!(
            name = %self.display_name,
            schema_changed = reconciled.schema_changed,
            rows = self.backend.num_rows(),
            columns = self.backend.num_columns(),
            "table replaced"
        );
        let event = if reconciled.schema_changed {
            ExplorerEvent::SchemaUpdate
        } else {
            ExplorerEvent::DataUpdate
        };
        if self.events.send(event).is_err() {
            debug!("event receiver gone");
        }
        reconciled.schema_changed
    }

    pub fn handle_request(&mut self, request: ExplorerRequest) -> ExplorerResult<ExplorerReply> {
        Ok(match request {
            ExplorerRequest::GetSchema { column_indices } => {
                ExplorerReply::GetSchema(self.get_schema(&column_indices)?)
            }
            ExplorerRequest::SearchSchema {
                filters,
                sort_order,
            } => ExplorerReply::SearchSchema(self.search_schema(&filters, sort_order)?),
            ExplorerRequest::SetRowFilters { filters } => {
                ExplorerReply::SetRowFilters(self.set_row_filters(filters)?)
            }
            ExplorerRequest::SetSortColumns { sort_keys } => {
                self.set_sort_columns(sort_keys)?;
                ExplorerReply::SetSortColumns
            }
            ExplorerRequest::GetDataValues {
                columns,
                format_options,
            } => ExplorerReply::GetDataValues(
                self.get_data_values(&columns, format_options.as_ref())?,
            ),
            ExplorerRequest::GetRowLabels {
                selection,
                format_options,
            } => ExplorerReply::GetRowLabels(
                self.get_row_labels(&selection, format_options.as_ref())?,
            ),
            ExplorerRequest::ExportDataSelection { selection, format } => {
                ExplorerReply::ExportDataSelection(self.export_data_selection(&selection, format)?)
            }
            ExplorerRequest::GetColumnProfiles {
                callback_id,
                profiles,
                format_options,
            } => {
                self.get_column_profiles(callback_id, &profiles, format_options.as_ref())?;
                ExplorerReply::GetColumnProfiles
            }
            ExplorerRequest::GetState => ExplorerReply::GetState(self.get_state()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PolarsBackend, RecordsBackend};
    use crate::comm::{
        ColumnProfileSpec, ColumnProfileType, ColumnValue, CompareOp, CompareParams,
        RowFilterKind,
    };
    use crate::backend::BackendKind;
    use crate::comm::ColumnDisplayType;
    use crate::error::{BackendError, BackendResult};
    use crate::scalar::Scalar;
    use polars::prelude::*;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;

    fn open(df: DataFrame) -> (DataExplorer, Receiver<ExplorerEvent>) {
        let (tx, rx) = mpsc::channel();
        let explorer = DataExplorer::new(
            "test",
            Arc::new(PolarsBackend::new(df)),
            ExplorerConfig::default(),
            tx,
        )
        .unwrap();
        (explorer, rx)
    }

    fn text(values: &[&str]) -> Vec<ColumnValue> {
        values
            .iter()
            .map(|v| ColumnValue::Formatted(v.to_string()))
            .collect()
    }

    #[test]
    fn filter_then_sort_then_read() {
        let (mut ex, _rx) =
            open(df!("a" => &[5i64, 1, 4, 2, 3], "b" => &["e", "a", "d", "b", "c"]).unwrap());
        let schema = ex.get_schema(&[0]).unwrap().columns.remove(0);
        let result = ex
            .set_row_filters(vec![RowFilter::new(
                "gt1",
                schema,
                RowFilterKind::Compare(CompareParams {
                    op: CompareOp::Gt,
                    value: "1".to_string(),
                }),
            )])
            .unwrap();
        assert_eq!(result.selected_num_rows, 4);
        ex.set_sort_columns(vec![ColumnSortKey {
            column_index: 0,
            ascending: false,
        }])
        .unwrap();

        let data = ex
            .get_data_values(
                &[ColumnSelection {
                    column_index: 1,
                    spec: ArraySelection::Range {
                        first_index: 0,
                        last_index: 100,
                    },
                }],
                None,
            )
            .unwrap();
        assert_eq!(data.columns[0], text(&["e", "d", "c", "b"]));
        assert_eq!(ex.filtered_indices().unwrap(), Some(&[0usize, 2, 3, 4][..]));
        assert_eq!(ex.row_view_indices().unwrap(), Some(&[0usize, 2, 4, 3][..]));

        let state = ex.get_state().unwrap();
        assert_eq!(state.table_shape.num_rows, 4);
        assert_eq!(state.table_unfiltered_shape.num_rows, 5);
        assert!(state.column_filters.is_empty());
    }

    #[test]
    fn sort_key_out_of_range_is_rejected() {
        let (mut ex, _rx) = open(df!("a" => &[1i64]).unwrap());
        let err = ex
            .set_sort_columns(vec![ColumnSortKey {
                column_index: 3,
                ascending: true,
            }])
            .unwrap_err();
        assert!(matches!(err, ExplorerError::IndexError(_)));
        assert!(ex.state().sort_keys.is_empty());
    }

    #[test]
    fn row_labels_require_backend_support() {
        let (mut ex, _rx) = open(df!("a" => &[1i64]).unwrap());
        let selection = ArraySelection::Indices { indices: vec![0] };
        assert!(matches!(
            ex.get_row_labels(&selection, None),
            Err(ExplorerError::NotImplemented(_))
        ));

        let backend = RecordsBackend::new(
            vec!["v".to_string()],
            vec![vec![Scalar::Int(1)], vec![Scalar::Int(2)]],
        )
        .with_row_labels(vec!["r1".to_string(), "r2".to_string()])
        .unwrap();
        let (tx, _rx) = mpsc::channel();
        let mut ex =
            DataExplorer::new("labels", Arc::new(backend), ExplorerConfig::default(), tx).unwrap();
        let labels = ex.get_row_labels(&selection, None).unwrap();
        assert_eq!(labels.row_labels, vec![text(&["r1"])]);
    }

    #[test]
    fn profiles_arrive_as_event() {
        let (mut ex, rx) = open(df!("a" => &[Some(1i64), None, Some(3)]).unwrap());
        let reply = ex
            .handle_request(ExplorerRequest::GetColumnProfiles {
                callback_id: "cb-1".to_string(),
                profiles: vec![ColumnProfileRequest {
                    column_index: 0,
                    profiles: vec![ColumnProfileSpec::new(ColumnProfileType::NullCount)],
                }],
                format_options: None,
            })
            .unwrap();
        assert_eq!(reply, ExplorerReply::GetColumnProfiles);
        match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
            ExplorerEvent::ColumnProfilesReady {
                callback_id,
                profiles,
            } => {
                assert_eq!(callback_id, "cb-1");
                assert_eq!(profiles[0].null_count, Some(1));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn replacing_table_emits_event() {
        let (mut ex, rx) = open(df!("a" => &[1i64, 2]).unwrap());
        let same = Arc::new(PolarsBackend::new(df!("a" => &[3i64, 4, 5]).unwrap()));
        assert!(!ex.notify_table_replaced(same));
        assert_eq!(rx.try_recv().unwrap(), ExplorerEvent::DataUpdate);

        let other = Arc::new(PolarsBackend::new(df!("b" => &["x"]).unwrap()));
        assert!(ex.notify_table_replaced(other));
        assert_eq!(rx.try_recv().unwrap(), ExplorerEvent::SchemaUpdate);
        assert_eq!(ex.get_state().unwrap().table_shape.num_rows, 1);
    }

    /// Polars table whose column 1 cannot report its timezone.
    #[derive(Debug)]
    struct BrokenMetadata(PolarsBackend);

    impl TableBackend for BrokenMetadata {
        fn kind(&self) -> BackendKind {
            self.0.kind()
        }

        fn num_rows(&self) -> usize {
            self.0.num_rows()
        }

        fn num_columns(&self) -> usize {
            self.0.num_columns()
        }

        fn column_name(&self, column: usize) -> BackendResult<String> {
            self.0.column_name(column)
        }

        fn column_type_name(&self, column: usize) -> BackendResult<String> {
            self.0.column_type_name(column)
        }

        fn column_type_display(&self, column: usize) -> BackendResult<ColumnDisplayType> {
            self.0.column_type_display(column)
        }

        fn column_timezone(&self, column: usize) -> BackendResult<Option<String>> {
            if column == 1 {
                return Err(BackendError::evaluation("timezone unavailable"));
            }
            self.0.column_timezone(column)
        }

        fn gather(&self, column: usize, rows: Option<&[usize]>) -> BackendResult<Vec<Scalar>> {
            self.0.gather(column, rows)
        }
    }

    #[test]
    fn failed_filter_update_keeps_previous_filters() {
        let backend = BrokenMetadata(PolarsBackend::new(
            df!("a" => &[1i64, 5, 3], "b" => &[10i64, 20, 30]).unwrap(),
        ));
        let config = ExplorerConfig {
            schema_limits: SchemaCacheLimits {
                max_cached_columns: 0,
                max_cached_cells: 0,
            },
            ..ExplorerConfig::default()
        };
        let (tx, _rx) = mpsc::channel();
        let mut ex = DataExplorer::new("broken", Arc::new(backend), config, tx).unwrap();

        let a = ex.get_schema(&[0]).unwrap().columns.remove(0);
        let gt = |id: &str, schema: ColumnSchema| {
            RowFilter::new(
                id,
                schema,
                RowFilterKind::Compare(CompareParams {
                    op: CompareOp::Gt,
                    value: "2".to_string(),
                }),
            )
        };
        ex.set_row_filters(vec![gt("a-gt", a)]).unwrap();
        assert_eq!(ex.filtered_indices().unwrap(), Some(&[1, 2][..]));

        let b = ColumnSchema {
            column_index: 1,
            column_name: "b".to_string(),
            type_name: "i64".to_string(),
            type_display: ColumnDisplayType::Number,
            timezone: None,
        };
        assert!(ex.set_row_filters(vec![gt("b-gt", b)]).is_err());

        let state = ex.get_state().unwrap();
        assert_eq!(state.row_filters.len(), 1);
        assert_eq!(state.row_filters[0].filter_id, "a-gt");
        assert_eq!(ex.filtered_indices().unwrap(), Some(&[1, 2][..]));
    }
}
