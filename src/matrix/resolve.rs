//! Matrix resolution
//!
//! Expands per-axis selectors into the ordered set of cells to act on:
//! cross-product, minus declared exclusions, de-duplicated, sorted.

use crate::config::schema::{AxisConfig, Config};
use crate::error::{DrydockError, DrydockResult};
use crate::matrix::cell::{compare_values, MatrixCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How one axis is selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSelector {
    /// These values, in any order
    Explicit(Vec<String>),
    /// Every known value
    All,
    /// Only the axis default
    Default,
}

impl FromStr for AxisSelector {
    type Err = DrydockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Self::All),
            "default" | "" => Ok(Self::Default),
            list => {
                let values: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect();
                if values.is_empty() {
                    Ok(Self::Default)
                } else {
                    Ok(Self::Explicit(values))
                }
            }
        }
    }
}

impl fmt::Display for AxisSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(values) => write!(f, "{}", values.join(",")),
            Self::All => write!(f, "all"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// A request for a set of cells; unmentioned axes use their default
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixRequest {
    selectors: BTreeMap<String, AxisSelector>,
}

impl MatrixRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select every known value on every axis
    pub fn everything(config: &Config) -> Self {
        let mut request = Self::new();
        for axis in &config.axes {
            request.select(&axis.name, AxisSelector::All);
        }
        request
    }

    /// Set the selector for one axis (last call wins)
    pub fn select(&mut self, axis: impl Into<String>, selector: AxisSelector) -> &mut Self {
        self.selectors.insert(axis.into(), selector);
        self
    }

    /// Parse `axis=selector` as accepted on the command line
    pub fn parse_selector(&mut self, spec: &str) -> DrydockResult<&mut Self> {
        let (axis, selector) = spec.split_once('=').ok_or_else(|| {
            DrydockError::User(format!(
                "Invalid axis selector '{}': expected axis=values|all|default",
                spec
            ))
        })?;
        let selector: AxisSelector = selector.parse()?;
        Ok(self.select(axis.trim(), selector))
    }

    pub fn selector(&self, axis: &str) -> AxisSelector {
        self.selectors
            .get(axis)
            .cloned()
            .unwrap_or(AxisSelector::Default)
    }
}

impl fmt::Display for MatrixRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.selectors.is_empty() {
            return write!(f, "defaults");
        }
        let parts: Vec<String> = self
            .selectors
            .iter()
            .map(|(axis, sel)| format!("{}={}", axis, sel))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Expands requests against the configured axes and exclusions
pub struct MatrixResolver<'a> {
    axes: &'a [AxisConfig],
    exclude: &'a [BTreeMap<String, String>],
}

impl<'a> MatrixResolver<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            axes: &config.axes,
            exclude: &config.exclude,
        }
    }

    /// Resolve `request` into the ordered, de-duplicated cell list
    pub fn resolve(&self, request: &MatrixRequest) -> DrydockResult<Vec<MatrixCell>> {
        for axis in request.selectors.keys() {
            if !self.axes.iter().any(|a| &a.name == axis) {
                return Err(DrydockError::UnknownAxis(axis.clone()));
            }
        }

        let mut per_axis: Vec<(&str, Vec<String>)> = Vec::with_capacity(self.axes.len());
        for axis in self.axes {
            let values = Self::expand_axis(axis, &request.selector(&axis.name))?;
            per_axis.push((axis.name.as_str(), values));
        }

        let product = cross_product(&per_axis);
        let total = product.len();

        let cells: BTreeSet<MatrixCell> = product
            .into_iter()
            .filter(|cell| !self.is_excluded(cell))
            .collect();

        debug!(
            "Resolved {} cell(s) from {} combination(s) for {}",
            cells.len(),
            total,
            request
        );

        if cells.is_empty() {
            let reason = if total == 0 {
                format!("no combinations for {}", request)
            } else {
                format!(
                    "all {} combination(s) for {} are excluded",
                    total, request
                )
            };
            return Err(DrydockError::EmptyMatrix { reason });
        }

        Ok(cells.into_iter().collect())
    }

    fn expand_axis(axis: &AxisConfig, selector: &AxisSelector) -> DrydockResult<Vec<String>> {
        let mut values: Vec<String> = match selector {
            AxisSelector::All => axis.values.clone(),
            AxisSelector::Default => axis.default_value().map(str::to_string).into_iter().collect(),
            AxisSelector::Explicit(requested) => {
                for value in requested {
                    if !axis.values.contains(value) {
                        return Err(DrydockError::UnknownAxisValue {
                            axis: axis.name.clone(),
                            value: value.clone(),
                            known: axis.values.join(", "),
                        });
                    }
                }
                requested.clone()
            }
        };
        values.sort_by(|a, b| compare_values(a, b));
        values.dedup();
        Ok(values)
    }

    fn is_excluded(&self, cell: &MatrixCell) -> bool {
        self.exclude
            .iter()
            .any(|rule| cell.matches_all(rule.iter().map(|(k, v)| (k.as_str(), v.as_str()))))
    }
}

fn cross_product(per_axis: &[(&str, Vec<String>)]) -> Vec<MatrixCell> {
    let mut partials: Vec<Vec<(&str, &str)>> = vec![Vec::new()];

    for (axis, values) in per_axis {
        let mut next = Vec::with_capacity(partials.len() * values.len());
        for partial in &partials {
            for value in values {
                let mut extended = partial.clone();
                extended.push((*axis, value.as_str()));
                next.push(extended);
            }
        }
        partials = next;
    }

    partials.into_iter().map(MatrixCell::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::AxisConfig;

    fn config() -> Config {
        let mut config = Config::default();
        config.axes = vec![
            AxisConfig::new("runtime", &["3.9", "3.10", "3.11"], Some("3.10")),
            AxisConfig::new("backend", &["sqlite", "postgres", "mysql"], Some("sqlite")),
        ];
        config
    }

    fn keys(cells: &[MatrixCell]) -> Vec<String> {
        cells.iter().map(MatrixCell::key).collect()
    }

    #[test]
    fn defaults_only() {
        let config = config();
        let cells = MatrixResolver::new(&config)
            .resolve(&MatrixRequest::new())
            .unwrap();
        assert_eq!(keys(&cells), vec!["runtime=3.10,backend=sqlite"]);
    }

    #[test]
    fn all_expands_cross_product_in_order() {
        let config = config();
        let mut request = MatrixRequest::new();
        request.select("runtime", AxisSelector::All);
        request.select("backend", "sqlite,mysql".parse().unwrap());

        let cells = MatrixResolver::new(&config).resolve(&request).unwrap();
        assert_eq!(
            keys(&cells),
            vec![
                "runtime=3.9,backend=mysql",
                "runtime=3.9,backend=sqlite",
                "runtime=3.10,backend=mysql",
                "runtime=3.10,backend=sqlite",
                "runtime=3.11,backend=mysql",
                "runtime=3.11,backend=sqlite",
            ]
        );
    }

    #[test]
    fn explicit_values_are_deduplicated() {
        let config = config();
        let mut request = MatrixRequest::new();
        request.parse_selector("runtime=3.11,3.9,3.11").unwrap();

        let cells = MatrixResolver::new(&config).resolve(&request).unwrap();
        assert_eq!(
            keys(&cells),
            vec!["runtime=3.9,backend=sqlite", "runtime=3.11,backend=sqlite"]
        );
    }

    #[test]
    fn exclusions_are_applied() {
        let mut config = config();
        let mut rule = BTreeMap::new();
        rule.insert("runtime".to_string(), "3.9".to_string());
        rule.insert("backend".to_string(), "mysql".to_string());
        config.exclude = vec![rule];

        let cells = MatrixResolver::new(&config)
            .resolve(&MatrixRequest::everything(&config))
            .unwrap();
        assert_eq!(cells.len(), 8);
        assert!(!keys(&cells).contains(&"runtime=3.9,backend=mysql".to_string()));
    }

    #[test]
    fn fully_excluded_request_is_empty_matrix() {
        let mut config = config();
        let mut rule = BTreeMap::new();
        rule.insert("backend".to_string(), "mysql".to_string());
        config.exclude = vec![rule];

        let mut request = MatrixRequest::new();
        request.parse_selector("backend=mysql").unwrap();

        let result = MatrixResolver::new(&config).resolve(&request);
        assert!(matches!(result, Err(DrydockError::EmptyMatrix { .. })));
    }

    #[test]
    fn unknown_axis_and_value_are_rejected() {
        let config = config();
        let mut request = MatrixRequest::new();
        request.parse_selector("arch=arm64").unwrap();
        assert!(matches!(
            MatrixResolver::new(&config).resolve(&request),
            Err(DrydockError::UnknownAxis(_))
        ));

        let mut request = MatrixRequest::new();
        request.parse_selector("runtime=2.7").unwrap();
        assert!(matches!(
            MatrixResolver::new(&config).resolve(&request),
            Err(DrydockError::UnknownAxisValue { .. })
        ));
    }

    #[test]
    fn selector_parsing() {
        assert_eq!("all".parse::<AxisSelector>().unwrap(), AxisSelector::All);
        assert_eq!("default".parse::<AxisSelector>().unwrap(), AxisSelector::Default);
        assert_eq!(
            "a, b".parse::<AxisSelector>().unwrap(),
            AxisSelector::Explicit(vec!["a".to_string(), "b".to_string()])
        );
        assert!(MatrixRequest::new().parse_selector("runtime").is_err());
    }

    #[test]
    fn resolution_is_deterministic() {
        let config = config();
        let request = MatrixRequest::everything(&config);
        let first = MatrixResolver::new(&config).resolve(&request).unwrap();
        let second = MatrixResolver::new(&config).resolve(&request).unwrap();
        assert_eq!(first, second);
    }
}
