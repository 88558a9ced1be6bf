//! Static table of which filters and profiles apply to which column types.

use crate::comm::{
    ColumnDisplayType, ColumnProfileType, ExportFormat, RowFilterType, SupportedFeatures,
    TypeSupport,
};

pub const UNSUPPORTED_FILTER_MESSAGE: &str = "Unsupported column type for filter";

pub fn row_filter_supported(filter: RowFilterType, display: ColumnDisplayType) -> bool {
    use ColumnDisplayType as D;
    use RowFilterType as F;
    match filter {
        F::IsNull | F::NotNull => true,
        F::IsEmpty | F::NotEmpty | F::Search => display == D::String,
        F::IsTrue | F::IsFalse => display == D::Boolean,
        F::Compare => matches!(
            display,
            D::Number | D::String | D::Boolean | D::Date | D::Datetime | D::Time
        ),
        F::Between | F::NotBetween => {
            matches!(display, D::Number | D::Date | D::Datetime | D::Time)
        }
        F::SetMembership => matches!(display, D::Number | D::String | D::Boolean),
    }
}

pub fn profile_supported(profile: ColumnProfileType, display: ColumnDisplayType) -> bool {
    use ColumnDisplayType as D;
    use ColumnProfileType as P;
    match profile {
        P::NullCount | P::SummaryStats => true,
        P::SmallHistogram | P::LargeHistogram => {
            matches!(display, D::Number | D::Date | D::Datetime)
        }
        P::SmallFrequencyTable | P::LargeFrequencyTable => {
            matches!(display, D::Number | D::String | D::Boolean)
        }
    }
}

pub fn supported_features() -> SupportedFeatures {
    let type_support = ColumnDisplayType::ALL
        .iter()
        .map(|&display| TypeSupport {
            type_display: display,
            row_filters: RowFilterType::ALL
                .iter()
                .copied()
                .filter(|&f| row_filter_supported(f, display))
                .collect(),
            profiles: ColumnProfileType::ALL
                .iter()
                .copied()
                .filter(|&p| profile_supported(p, display))
                .collect(),
        })
        .collect();

    SupportedFeatures {
        search_schema: true,
        set_sort_columns: true,
        row_filter_conditions: true,
        row_filter_types: RowFilterType::ALL.to_vec(),
        column_profile_types: ColumnProfileType::ALL.to_vec(),
        export_formats: vec![ExportFormat::Csv, ExportFormat::Tsv, ExportFormat::Html],
        type_support,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_checks_apply_everywhere() {
        for display in ColumnDisplayType::ALL {
            assert!(row_filter_supported(RowFilterType::IsNull, display));
            assert!(row_filter_supported(RowFilterType::NotNull, display));
        }
    }

    #[test]
    fn text_filters_only_on_strings() {
        assert!(row_filter_supported(RowFilterType::Search, ColumnDisplayType::String));
        assert!(!row_filter_supported(RowFilterType::Search, ColumnDisplayType::Number));
        assert!(!row_filter_supported(RowFilterType::IsTrue, ColumnDisplayType::String));
        assert!(!row_filter_supported(RowFilterType::Between, ColumnDisplayType::String));
    }

    #[test]
    fn histograms_need_an_ordered_domain() {
        assert!(profile_supported(ColumnProfileType::SmallHistogram, ColumnDisplayType::Date));
        assert!(!profile_supported(ColumnProfileType::LargeHistogram, ColumnDisplayType::String));
        assert!(profile_supported(
            ColumnProfileType::SmallFrequencyTable,
            ColumnDisplayType::Boolean
        ));
    }

    #[test]
    fn feature_table_covers_every_display_type() {
        let features = supported_features();
        assert_eq!(features.type_support.len(), ColumnDisplayType::ALL.len());
        let object = features
            .type_support
            .iter()
            .find(|t| t.type_display == ColumnDisplayType::Object)
            .unwrap();
        assert_eq!(
            object.row_filters,
            vec![RowFilterType::IsNull, RowFilterType::NotNull]
        );
    }
}
