use crate::error::ConfigError;
use crate::models::ModelKind;
use std::collections::BTreeMap;
use url::Url;

pub const PARAM_MODEL: &str = "model";
pub const PARAM_WINDOW_SIZE: &str = "window_size";
pub const PARAM_ERROR_BOUND: &str = "error_bound";

pub const PARAM_METADATA_SERVER: &str = "metadata_server_url";
pub const PARAM_METADATA_USERNAME: &str = "user";
pub const PARAM_METADATA_PASSWORD: &str = "password";
pub const PARAM_METADATA_OPERATOR: &str = "operator";
pub const PARAM_METADATA_DEPLOYMENT: &str = "deployment";
pub const PARAM_METADATA_STATION: &str = "station";
pub const PARAM_METADATA_SENSOR: &str = "sensor";

/// Largest accepted window. The buffer and the fitted columns are allocated
/// up front at this size.
pub const MAX_WINDOW_SIZE: usize = 1 << 20;

pub const ALL_PARAMS: [&str; 10] = [
    PARAM_MODEL,
    PARAM_WINDOW_SIZE,
    PARAM_ERROR_BOUND,
    PARAM_METADATA_SERVER,
    PARAM_METADATA_USERNAME,
    PARAM_METADATA_PASSWORD,
    PARAM_METADATA_OPERATOR,
    PARAM_METADATA_DEPLOYMENT,
    PARAM_METADATA_STATION,
    PARAM_METADATA_SENSOR,
];

/// Validated, immutable cleaning parameters for one sensor instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningParams {
    pub model: ModelKind,
    pub window_size: usize,
    pub error_bound: f64,
    pub metadata: Option<MetadataTarget>,
}

#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where and as whom dirty points are published. Only exists when every
/// identity field was configured.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataTarget {
    pub server_url: Url,
    pub credentials: Option<Credentials>,
    pub operator: String,
    pub deployment: String,
    pub station: String,
    pub sensor: String,
    pub template: MetadataTemplate,
}

/// The metadata XML with the identity block already rendered. Only the
/// per-event `from`, `to` and `dirtiness` elements remain to be filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataTemplate {
    head: String,
}

impl MetadataTemplate {
    pub fn new(deployment: &str, operator: &str, station: &str, sensor: &str) -> Self {
        let head = format!(
            "<metadata>\n\
             \t<deployment>{}</deployment>\n\
             \t<operator>{}</operator>\n\
             \t<station>{}</station>\n\
             \t<sensor>{}</sensor>\n",
            escape_xml(deployment),
            escape_xml(operator),
            escape_xml(station),
            escape_xml(sensor),
        );
        Self { head }
    }

    pub fn render(&self, from: &str, to: &str, dirtiness: f64) -> String {
        format!(
            "{}\t<from>{}</from>\n\t<to>{}</to>\n\t<dirtiness>{}</dirtiness>\n</metadata>",
            self.head,
            escape_xml(from),
            escape_xml(to),
            dirtiness
        )
    }
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn lookup<'a>(params: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    params.get(name).map(|value| value.trim())
}

fn required<'a>(
    params: &'a BTreeMap<String, String>,
    name: &'static str,
) -> Result<&'a str, ConfigError> {
    lookup(params, name).ok_or_else(|| {
        tracing::warn!(parameter = name, "required parameter not provided");
        ConfigError::MissingParameter { name }
    })
}

fn invalid(name: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    let reason = reason.into();
    tracing::warn!(parameter = name, value, %reason, "parameter incorrect");
    ConfigError::InvalidParameter {
        name,
        value: value.to_string(),
        reason,
    }
}

impl CleaningParams {
    /// Validates the flat parameter map. Required parameters fail hard;
    /// an incomplete metadata block only disables publication.
    pub fn from_params(params: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let model_raw = required(params, PARAM_MODEL)?;
        let model = ModelKind::from_name(model_raw).ok_or_else(|| {
            tracing::warn!(parameter = PARAM_MODEL, value = model_raw, "unknown model");
            ConfigError::UnknownModel {
                name: model_raw.to_string(),
            }
        })?;

        let window_raw = required(params, PARAM_WINDOW_SIZE)?;
        let window_size = window_raw
            .parse::<i64>()
            .map_err(|err| invalid(PARAM_WINDOW_SIZE, window_raw, err.to_string()))?;
        if window_size < 0 {
            return Err(invalid(
                PARAM_WINDOW_SIZE,
                window_raw,
                "window size must not be negative",
            ));
        }
        let window_size = usize::try_from(window_size)
            .ok()
            .filter(|size| *size <= MAX_WINDOW_SIZE)
            .ok_or_else(|| {
                invalid(
                    PARAM_WINDOW_SIZE,
                    window_raw,
                    format!("window size must not exceed {MAX_WINDOW_SIZE}"),
                )
            })?;
        if window_size == 0 {
            tracing::warn!("window size is 0; no window will ever be processed");
        }

        let bound_raw = required(params, PARAM_ERROR_BOUND)?;
        let error_bound = bound_raw
            .parse::<f64>()
            .map_err(|err| invalid(PARAM_ERROR_BOUND, bound_raw, err.to_string()))?;
        if error_bound.is_nan() {
            return Err(invalid(PARAM_ERROR_BOUND, bound_raw, "not a number"));
        }

        let metadata = MetadataTarget::from_params(params);

        Ok(Self {
            model,
            window_size,
            error_bound,
            metadata,
        })
    }

    pub fn publishes_metadata(&self) -> bool {
        self.metadata.is_some()
    }
}

impl MetadataTarget {
    fn from_params(params: &BTreeMap<String, String>) -> Option<Self> {
        let url_raw = lookup(params, PARAM_METADATA_SERVER)?;
        let server_url = match Url::parse(url_raw) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(
                    url = url_raw,
                    error = %err,
                    "metadata server url is invalid; publication disabled"
                );
                return None;
            }
        };

        let credentials = match (
            lookup(params, PARAM_METADATA_USERNAME),
            lookup(params, PARAM_METADATA_PASSWORD),
        ) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => None,
        };

        let identity = (
            lookup(params, PARAM_METADATA_OPERATOR),
            lookup(params, PARAM_METADATA_DEPLOYMENT),
            lookup(params, PARAM_METADATA_STATION),
            lookup(params, PARAM_METADATA_SENSOR),
        );
        let (Some(operator), Some(deployment), Some(station), Some(sensor)) = identity else {
            let missing: Vec<&str> = [
                (PARAM_METADATA_OPERATOR, identity.0),
                (PARAM_METADATA_DEPLOYMENT, identity.1),
                (PARAM_METADATA_STATION, identity.2),
                (PARAM_METADATA_SENSOR, identity.3),
            ]
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name)
            .collect();
            tracing::warn!(
                missing = ?missing,
                "a parameter required for publishing metadata is missing; publication disabled"
            );
            return None;
        };

        Some(Self {
            server_url,
            credentials,
            template: MetadataTemplate::new(deployment, operator, station, sensor),
            operator: operator.to_string(),
            deployment: deployment.to_string(),
            station: station.to_string(),
            sensor: sensor.to_string(),
        })
    }
}
