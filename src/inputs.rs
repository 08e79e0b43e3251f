//! Task inputs
//!
//! Everything the task reads from the agent is resolved here, once, into a
//! [`DistributeInputs`]. Missing required inputs are [`Error::Config`] errors
//! naming the input.

use crate::error::{Error, Result};
use crate::http::{ApiEndpoint, RequestSource};
use crate::pipeline::VariableSource;
use crate::types::{BuildInfo, DestinationType, PublishRequest, SymbolType};
use regex::Regex;
use std::path::PathBuf;
use tracing::debug;

/// Group used when no destination group is set
pub const DEFAULT_DESTINATION_ID: &str = "00000000-0000-0000-0000-000000000000";

const USER_AGENT_SUFFIX: &str = " (Task:VSMobileCenterUpload)";
const REFS_HEADS: &str = "refs/heads/";

/// One symbols input to resolve
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolsLookup {
    /// Kind of symbols uploaded from this input
    pub symbol_type: SymbolType,
    /// Input the pattern was read from
    pub input: &'static str,
    /// Path pattern, `None` when the input is empty
    pub pattern: Option<String>,
    /// Zip even a single file
    pub force_archive: bool,
}

/// Resolved task inputs
#[derive(Clone, Debug)]
pub struct DistributeInputs {
    /// API endpoint and token
    pub endpoint: ApiEndpoint,
    /// `User-Agent` header value
    pub user_agent: String,
    /// `{owner}/{app}`
    pub app_slug: String,
    /// Pattern of the binary to upload
    pub app_pattern: String,
    /// Build version override
    pub build_version: Option<String>,
    /// Release notes text
    pub release_notes: String,
    /// Force testers to update (always false for stores)
    pub mandatory: bool,
    /// Do not notify testers (always false for stores)
    pub silent: bool,
    /// Groups or store
    pub destination_type: DestinationType,
    /// Distribution group ids, or the single store id
    pub destination_ids: Vec<String>,
    /// Symbols inputs, in upload order
    pub symbols: Vec<SymbolsLookup>,
    /// Upload the parent folder of each symbols match
    pub pack_parent_folder: bool,
    /// Warn instead of failing when symbols are missing
    pub continue_if_symbols_not_found: bool,
    /// CI build descriptor
    pub build: Option<BuildInfo>,
    /// Source tag of the publish call
    pub request_source: RequestSource,
    /// Optional JSON file with tunables
    pub config_file: Option<PathBuf>,
}

impl DistributeInputs {
    /// Read and validate all inputs from `source`
    pub fn from_source(source: &dyn VariableSource) -> Result<Self> {
        let endpoint = endpoint(source)?;
        let user_agent = format!(
            "{}{}",
            source
                .variable("MSDEPLOY_HTTP_USER_AGENT")
                .unwrap_or_else(|| "VSTS".to_string()),
            USER_AGENT_SUFFIX
        );

        let destination_type = destination_type(source)?;
        let destination_ids = destination_ids(source, destination_type)?;
        let groups = destination_type == DestinationType::Groups;

        let commit_message = source.variable("LASTCOMMITMESSAGE");
        let request_source = if commit_message.is_some() {
            RequestSource::VstsAppCenter
        } else {
            RequestSource::Vsts
        };

        Ok(Self {
            endpoint,
            user_agent,
            app_slug: required(source, "appSlug")?,
            app_pattern: required(source, "app")?,
            build_version: source.input("buildVersion"),
            release_notes: release_notes(source)?,
            mandatory: groups && source.bool_input("isMandatory"),
            silent: groups && source.bool_input("isSilent"),
            destination_type,
            destination_ids,
            symbols: symbols_lookups(source)?,
            pack_parent_folder: source.bool_input("packParentFolder"),
            continue_if_symbols_not_found: source
                .variable("VSMobileCenterUpload.ContinueIfSymbolsNotFound")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            build: build_info(source, commit_message),
            request_source,
            config_file: source
                .variable("AppCenterDistribute.ConfigFile")
                .map(PathBuf::from),
        })
    }

    /// Publish body for these inputs
    pub fn publish_request(&self) -> PublishRequest {
        if self.destination_type == DestinationType::Store {
            let store_id = self.destination_ids.first().cloned().unwrap_or_default();
            return PublishRequest::store(self.release_notes.clone(), store_id, self.build.clone());
        }

        let request = PublishRequest::new(
            self.release_notes.clone(),
            self.mandatory,
            &self.destination_ids,
            self.build.clone(),
        );
        if self.silent { request.silent() } else { request }
    }
}

fn required(source: &dyn VariableSource, name: &str) -> Result<String> {
    source
        .input(name)
        .ok_or_else(|| Error::config(format!("input required: {name}"), name))
}

fn endpoint(source: &dyn VariableSource) -> Result<ApiEndpoint> {
    let id = required(source, "serverEndpoint")?;
    let url = source
        .endpoint_url(&id)
        .ok_or_else(|| Error::config("cannot decode the service endpoint", "serverEndpoint"))?;
    let token = source
        .endpoint_auth_parameter(&id, "apitoken")
        .ok_or_else(|| Error::config("no API token found on the service endpoint", "serverEndpoint"))?;

    let mut endpoint = ApiEndpoint::from_url(&url, token)?;
    if let Some(server) = source.var("SONOMA_API_SERVER").filter(|s| !s.is_empty()) {
        endpoint.server = server.trim_end_matches('/').to_string();
    }
    if let Some(version) = source.var("SONOMA_API_VERSION").filter(|v| !v.is_empty()) {
        endpoint.version = version;
    }
    debug!(server = %endpoint.server, version = %endpoint.version, "effective API url");
    Ok(endpoint)
}

fn release_notes(source: &dyn VariableSource) -> Result<String> {
    if source.input("releaseNotesSelection").as_deref() == Some("file") {
        let file = required(source, "releaseNotesFile")?;
        return std::fs::read_to_string(&file).map_err(|e| Error::Config {
            message: format!("failed to read release notes file {file}: {e}"),
            key: Some("releaseNotesFile".to_string()),
        });
    }
    required(source, "releaseNotesInput")
}

fn destination_type(source: &dyn VariableSource) -> Result<DestinationType> {
    match source.input("destinationType").as_deref() {
        None | Some("groups") => Ok(DestinationType::Groups),
        Some("store") => Ok(DestinationType::Store),
        Some(other) => Err(Error::config(
            format!("unknown destination type: {other}"),
            "destinationType",
        )),
    }
}

fn destination_ids(
    source: &dyn VariableSource,
    destination_type: DestinationType,
) -> Result<Vec<String>> {
    let (input, destinations) = match destination_type {
        DestinationType::Groups => ["destinationGroupIds", "destinationIds"]
            .into_iter()
            .find_map(|name| source.input(name).map(|value| (name, value)))
            .unwrap_or(("destinationGroupIds", DEFAULT_DESTINATION_ID.to_string())),
        DestinationType::Store => ("destinationStoreId", required(source, "destinationStoreId")?),
    };
    debug!(destinations = %destinations, "effective destination ids");

    let ids = split_destination_ids(&destinations);
    if ids.is_empty() {
        return Err(Error::config(
            "destination ids must list at least one destination",
            input,
        ));
    }
    if destination_type == DestinationType::Store && ids.len() > 1 {
        return Err(Error::config(
            "cannot distribute to multiple stores",
            input,
        ));
    }
    Ok(ids)
}

/// Split on runs of commas, spaces and semicolons
pub fn split_destination_ids(value: &str) -> Vec<String> {
    match Regex::new(r"[, ;]+") {
        Ok(separators) => separators
            .split(value)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => vec![value.to_string()],
    }
}

fn symbols_lookups(source: &dyn VariableSource) -> Result<Vec<SymbolsLookup>> {
    let lookup = |symbol_type, input: &'static str, force_archive| SymbolsLookup {
        symbol_type,
        input,
        pattern: source.input(input),
        force_archive,
    };

    let lookups = match source.input("symbolsType").as_deref() {
        Some("Apple") => vec![lookup(SymbolType::Apple, "dsymPath", false)],
        Some("Android") => vec![
            lookup(SymbolType::AndroidProguard, "mappingTxtPath", false),
            lookup(SymbolType::Breakpad, "nativeLibrariesPath", true),
        ],
        Some("UWP") => vec![lookup(SymbolType::Uwp, "appxsymPath", false)],
        Some("AndroidProguard") => vec![lookup(SymbolType::AndroidProguard, "symbolsPath", false)],
        Some("Breakpad") => vec![lookup(SymbolType::Breakpad, "symbolsPath", false)],
        Some(other) => {
            return Err(Error::config(
                format!("unsupported symbols type: {other}"),
                "symbolsType",
            ));
        }
        None if source.input("symbolsPath").is_some() => {
            return Err(Error::config(
                "symbolsPath needs a symbolsType",
                "symbolsType",
            ));
        }
        None => Vec::new(),
    };
    Ok(lookups)
}

/// Strip a leading `refs/heads/`
pub fn branch_name(reference: &str) -> &str {
    reference.strip_prefix(REFS_HEADS).unwrap_or(reference)
}

fn build_info(source: &dyn VariableSource, commit_message: Option<String>) -> Option<BuildInfo> {
    let branch = source.variable("Build.SourceBranch")?;
    let commit_hash = source.variable("Build.SourceVersion")?;
    Some(BuildInfo {
        id: source.variable("Build.BuildId").unwrap_or_default(),
        branch: branch_name(&branch).to_string(),
        commit_hash,
        commit_message,
    })
}
