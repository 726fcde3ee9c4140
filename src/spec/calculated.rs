use crate::spec::Placement;
use serde::Deserialize;
use serde::Deserializer;

/// Aggregate family shared by cumulative and rolling columns.
#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Sum,
    Average,
    Count,
    Min,
    Max,
}

/// Behavior of a rolling column on rows preceding a full window.
#[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartialWindow {
    /// Aggregate over however many rows are available
    #[default]
    Partial,
    /// Null until the window is full
    Null,
}

/// Flavor of a percentage column.
#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PercentageMode {
    /// Share of the column total across all rows
    OfTotal,
    /// Change from the previous row
    Change,
}

/// Declarative description of one derived column.
///
/// Each kind is its own variant. Deserialization goes through a raw
/// carrier struct so that unknown kinds, unknown fields, and fields that
/// do not belong to the declared kind are all rejected at configuration
/// load rather than silently ignored.
#[derive(Clone, Debug)]
pub enum CalculatedColumnSpec {
    /// Running aggregate of a source column over rows 0..=i
    Cumulative {
        name: String,
        source: String,
        aggregate: Aggregate,
        placement: Placement,
    },
    /// Aggregate over the trailing `window` rows
    Rolling {
        name: String,
        source: String,
        aggregate: Aggregate,
        window: usize,
        on_partial_window: PartialWindow,
        placement: Placement,
    },
    /// Share-of-total or change-from-previous-row percentage
    Percentage {
        name: String,
        source: String,
        mode: PercentageMode,
        placement: Placement,
    },
    /// Row-local arithmetic expression over existing columns
    Custom {
        name: String,
        expression: String,
        placement: Placement,
    },
    /// Wall-clock date at processing time, formatted per `format`
    CurrentDate {
        name: String,
        format: String,
        placement: Placement,
    },
}

impl CalculatedColumnSpec {
    /// Output column name.
    pub fn name(&self) -> &str {
        match self {
            Self::Cumulative { name, .. }
            | Self::Rolling { name, .. }
            | Self::Percentage { name, .. }
            | Self::Custom { name, .. }
            | Self::CurrentDate { name, .. } => name,
        }
    }

    /// Placement policy of the output column.
    pub fn placement(&self) -> Placement {
        match self {
            Self::Cumulative { placement, .. }
            | Self::Rolling { placement, .. }
            | Self::Percentage { placement, .. }
            | Self::Custom { placement, .. }
            | Self::CurrentDate { placement, .. } => *placement,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawKind {
    Cumulative,
    Rolling,
    Percentage,
    Custom,
    CurrentDate,
}

impl RawKind {
    const fn as_str(&self) -> &'static str {
        match self {
            RawKind::Cumulative => "cumulative",
            RawKind::Rolling => "rolling",
            RawKind::Percentage => "percentage",
            RawKind::Custom => "custom",
            RawKind::CurrentDate => "current_date",
        }
    }
}

/// Flat carrier for every field any kind accepts; per-kind membership is
/// enforced after parsing.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCalculatedColumn {
    kind: RawKind,
    name: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    aggregate: Option<Aggregate>,
    #[serde(default)]
    window: Option<usize>,
    #[serde(default)]
    on_partial_window: Option<PartialWindow>,
    #[serde(default)]
    mode: Option<PercentageMode>,
    #[serde(default)]
    expression: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    placement: Option<Placement>,
}

fn require<T>(field: Option<T>, raw: &RawCalculatedColumn, field_name: &str) -> Result<T, String> {
    field.ok_or_else(|| {
        format!(
            "calculated column '{}' of kind '{}' requires '{}'",
            raw.name,
            raw.kind.as_str(),
            field_name
        )
    })
}

fn forbid<T>(field: &Option<T>, raw: &RawCalculatedColumn, field_name: &str) -> Result<(), String> {
    if field.is_some() {
        Err(format!(
            "field '{}' does not apply to calculated column '{}' of kind '{}'",
            field_name,
            raw.name,
            raw.kind.as_str()
        ))
    } else {
        Ok(())
    }
}

impl TryFrom<RawCalculatedColumn> for CalculatedColumnSpec {
    type Error = String;

    fn try_from(raw: RawCalculatedColumn) -> Result<Self, Self::Error> {
        let placement = raw.placement.unwrap_or(Placement::AllRows);
        match raw.kind {
            RawKind::Cumulative => {
                forbid(&raw.window, &raw, "window")?;
                forbid(&raw.on_partial_window, &raw, "on_partial_window")?;
                forbid(&raw.mode, &raw, "mode")?;
                forbid(&raw.expression, &raw, "expression")?;
                forbid(&raw.format, &raw, "format")?;
                Ok(CalculatedColumnSpec::Cumulative {
                    source: require(raw.source.clone(), &raw, "source")?,
                    aggregate: require(raw.aggregate, &raw, "aggregate")?,
                    name: raw.name,
                    placement,
                })
            }
            RawKind::Rolling => {
                forbid(&raw.mode, &raw, "mode")?;
                forbid(&raw.expression, &raw, "expression")?;
                forbid(&raw.format, &raw, "format")?;
                Ok(CalculatedColumnSpec::Rolling {
                    source: require(raw.source.clone(), &raw, "source")?,
                    aggregate: require(raw.aggregate, &raw, "aggregate")?,
                    window: require(raw.window, &raw, "window")?,
                    on_partial_window: raw.on_partial_window.unwrap_or_default(),
                    name: raw.name,
                    placement,
                })
            }
            RawKind::Percentage => {
                forbid(&raw.aggregate, &raw, "aggregate")?;
                forbid(&raw.window, &raw, "window")?;
                forbid(&raw.on_partial_window, &raw, "on_partial_window")?;
                forbid(&raw.expression, &raw, "expression")?;
                forbid(&raw.format, &raw, "format")?;
                Ok(CalculatedColumnSpec::Percentage {
                    source: require(raw.source.clone(), &raw, "source")?,
                    mode: require(raw.mode, &raw, "mode")?,
                    name: raw.name,
                    placement,
                })
            }
            RawKind::Custom => {
                forbid(&raw.source, &raw, "source")?;
                forbid(&raw.aggregate, &raw, "aggregate")?;
                forbid(&raw.window, &raw, "window")?;
                forbid(&raw.on_partial_window, &raw, "on_partial_window")?;
                forbid(&raw.mode, &raw, "mode")?;
                forbid(&raw.format, &raw, "format")?;
                Ok(CalculatedColumnSpec::Custom {
                    expression: require(raw.expression.clone(), &raw, "expression")?,
                    name: raw.name,
                    placement,
                })
            }
            RawKind::CurrentDate => {
                forbid(&raw.source, &raw, "source")?;
                forbid(&raw.aggregate, &raw, "aggregate")?;
                forbid(&raw.window, &raw, "window")?;
                forbid(&raw.on_partial_window, &raw, "on_partial_window")?;
                forbid(&raw.mode, &raw, "mode")?;
                forbid(&raw.expression, &raw, "expression")?;
                Ok(CalculatedColumnSpec::CurrentDate {
                    format: raw.format.clone().unwrap_or_else(|| "%Y-%m-%d".to_owned()),
                    name: raw.name,
                    placement,
                })
            }
        }
    }
}

impl<'de> Deserialize<'de> for CalculatedColumnSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawCalculatedColumn::deserialize(deserializer)?;
        CalculatedColumnSpec::try_from(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Holder {
        columns: Vec<CalculatedColumnSpec>,
    }

    #[test]
    fn cumulative_from_toml() {
        let holder: Holder = toml::from_str(
            r#"
            [[columns]]
            kind = "cumulative"
            name = "value_to_date"
            source = "value"
            aggregate = "sum"
            "#,
        )
        .unwrap();
        let spec = &holder.columns[0];
        assert_eq!(spec.name(), "value_to_date");
        assert_eq!(spec.placement(), Placement::AllRows);
        assert!(matches!(
            spec,
            CalculatedColumnSpec::Cumulative {
                aggregate: Aggregate::Sum,
                ..
            }
        ));
    }

    #[test]
    fn rolling_defaults_to_partial_windows() {
        let holder: Holder = toml::from_str(
            r#"
            [[columns]]
            kind = "rolling"
            name = "week_avg"
            source = "value"
            aggregate = "average"
            window = 7
            "#,
        )
        .unwrap();
        assert!(matches!(
            holder.columns[0],
            CalculatedColumnSpec::Rolling {
                on_partial_window: PartialWindow::Partial,
                window: 7,
                ..
            }
        ));
    }

    #[test]
    fn current_date_defaults_to_iso_format() {
        let holder: Holder = toml::from_str(
            r#"
            [[columns]]
            kind = "current_date"
            name = "loaded_at"
            placement = "first_row"
            "#,
        )
        .unwrap();
        assert!(matches!(
            &holder.columns[0],
            CalculatedColumnSpec::CurrentDate { format, placement: Placement::FirstRow, .. }
                if format == "%Y-%m-%d"
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let result: Result<Holder, _> = toml::from_str(
            r#"
            [[columns]]
            kind = "median_of_medians"
            name = "x"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let result: Result<Holder, _> = toml::from_str(
            r#"
            [[columns]]
            kind = "current_date"
            name = "loaded_at"
            windows = 3
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn field_of_another_kind_is_rejected() {
        let result: Result<Holder, _> = toml::from_str(
            r#"
            [[columns]]
            kind = "current_date"
            name = "loaded_at"
            window = 3
            "#,
        );
        assert!(result.unwrap_err().to_string().contains("window"));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let result: Result<Holder, _> = toml::from_str(
            r#"
            [[columns]]
            kind = "rolling"
            name = "week_avg"
            source = "value"
            aggregate = "average"
            "#,
        );
        assert!(result.unwrap_err().to_string().contains("window"));
    }
}
