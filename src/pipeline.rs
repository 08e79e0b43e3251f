//! Pipeline agent protocol
//!
//! The agent hands task inputs, service endpoints and pipeline variables over
//! as environment variables and reads logging commands
//! (`##vso[area.action key=value;]data`) from stdout. [`AgentLayer`] turns
//! `tracing` events into those commands so the rest of the crate only logs.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};

/// Read access to the variables the agent exposes to a task
pub trait VariableSource {
    /// Raw value of an environment-style variable
    fn var(&self, name: &str) -> Option<String>;

    /// Task input `name`, trimmed; `None` when unset or blank
    fn input(&self, name: &str) -> Option<String> {
        let key = format!("INPUT_{}", name.replace(' ', "_").to_uppercase());
        non_blank(self.var(&key))
    }

    /// Boolean task input; only `true` (any case) is true
    fn bool_input(&self, name: &str) -> bool {
        self.input(name)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    /// Pipeline variable `name` (e.g. `Build.BuildId`)
    fn variable(&self, name: &str) -> Option<String> {
        let key = name.replace(['.', ' '], "_").to_uppercase();
        non_blank(self.var(&key))
    }

    /// URL of the service endpoint `id`
    fn endpoint_url(&self, id: &str) -> Option<String> {
        non_blank(self.var(&format!("ENDPOINT_URL_{id}")))
    }

    /// Authorization parameter `key` of the service endpoint `id`
    fn endpoint_auth_parameter(&self, id: &str, key: &str) -> Option<String> {
        non_blank(self.var(&format!(
            "ENDPOINT_AUTH_PARAMETER_{id}_{}",
            key.to_uppercase()
        )))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Variables from the process environment
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnv;

impl VariableSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl VariableSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Final result reported with `task.complete`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskResult {
    /// Task succeeded
    Succeeded,
    /// Task succeeded but logged warnings the user should see
    SucceededWithIssues,
    /// Task failed
    Failed,
}

impl TaskResult {
    /// Name used by the agent
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskResult::Succeeded => "Succeeded",
            TaskResult::SucceededWithIssues => "SucceededWithIssues",
            TaskResult::Failed => "Failed",
        }
    }
}

/// Escape the data part of a logging command
pub fn escape_data(data: &str) -> String {
    data.replace('%', "%AZP25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Escape a property value of a logging command
pub fn escape_property(value: &str) -> String {
    escape_data(value).replace(']', "%5D").replace(';', "%3B")
}

/// Format `##vso[{command} k=v;...]data`
pub fn logging_command(command: &str, properties: &[(&str, &str)], data: &str) -> String {
    let mut line = format!("##vso[{command}");
    if !properties.is_empty() {
        line.push(' ');
        for (key, value) in properties {
            line.push_str(key);
            line.push('=');
            line.push_str(&escape_property(value));
            line.push(';');
        }
    }
    line.push(']');
    line.push_str(&escape_data(data));
    line
}

/// `task.complete` command for `result`
pub fn complete_command(result: TaskResult, message: &str) -> String {
    logging_command("task.complete", &[("result", result.as_str())], message)
}

/// `tracing` layer writing events as agent logging commands
///
/// DEBUG and TRACE become `task.debug`, INFO a plain output line, WARN and
/// ERROR a `task.logissue` of the matching type.
pub struct AgentLayer<W = fn() -> std::io::Stdout> {
    make_writer: W,
}

impl AgentLayer {
    /// Layer writing to stdout
    pub fn stdout() -> Self {
        Self {
            make_writer: std::io::stdout,
        }
    }
}

impl<W> AgentLayer<W>
where
    W: for<'a> MakeWriter<'a> + 'static,
{
    /// Layer writing through `make_writer`
    pub fn with_writer(make_writer: W) -> Self {
        Self { make_writer }
    }
}

impl<W> fmt::Debug for AgentLayer<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentLayer").finish_non_exhaustive()
    }
}

impl<S, W> Layer<S> for AgentLayer<W>
where
    S: Subscriber,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let text = visitor.finish();

        let line = match *event.metadata().level() {
            Level::ERROR => logging_command("task.logissue", &[("type", "error")], &text),
            Level::WARN => logging_command("task.logissue", &[("type", "warning")], &text),
            Level::INFO => text,
            _ => logging_command("task.debug", &[], &text),
        };

        let mut writer = self.make_writer.make_writer();
        writeln!(writer, "{line}").ok();
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        let fields = self.fields.join(" ");
        if self.message.is_empty() {
            fields
        } else {
            format!("{} {}", self.message, fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[test]
    fn inputs_are_read_from_upper_cased_names() {
        let source = vars(&[
            ("INPUT_APPSLUG", " testuser/testapp "),
            ("INPUT_ISMANDATORY", "True"),
            ("INPUT_RELEASENOTESINPUT", "   "),
        ]);
        assert_eq!(source.input("appSlug").as_deref(), Some("testuser/testapp"));
        assert!(source.bool_input("isMandatory"));
        assert!(!source.bool_input("isSilent"));
        assert_eq!(source.input("releaseNotesInput"), None);
    }

    #[test]
    fn variables_replace_dots_and_spaces() {
        let source = vars(&[
            ("BUILD_SOURCEBRANCH", "refs/heads/master"),
            ("VSMOBILECENTERUPLOAD_CONTINUEIFSYMBOLSNOTFOUND", "true"),
        ]);
        assert_eq!(
            source.variable("Build.SourceBranch").as_deref(),
            Some("refs/heads/master")
        );
        assert_eq!(
            source
                .variable("VSMobileCenterUpload.ContinueIfSymbolsNotFound")
                .as_deref(),
            Some("true")
        );
    }

    #[test]
    fn endpoint_values_are_keyed_by_id() {
        let source = vars(&[
            ("ENDPOINT_URL_MyTestEndpoint", "https://example.test/v0.1"),
            ("ENDPOINT_AUTH_PARAMETER_MyTestEndpoint_APITOKEN", "mytoken123"),
        ]);
        assert_eq!(
            source.endpoint_url("MyTestEndpoint").as_deref(),
            Some("https://example.test/v0.1")
        );
        assert_eq!(
            source
                .endpoint_auth_parameter("MyTestEndpoint", "apitoken")
                .as_deref(),
            Some("mytoken123")
        );
    }

    #[test]
    fn logging_commands_escape_data_and_properties() {
        assert_eq!(
            logging_command("task.debug", &[], "100% done\r\nnext"),
            "##vso[task.debug]100%AZP25 done%0D%0Anext"
        );
        assert_eq!(
            logging_command("task.logissue", &[("type", "a;b]c")], "x"),
            "##vso[task.logissue type=a%3Bb%5Dc;]x"
        );
        assert_eq!(
            complete_command(TaskResult::Failed, "boom"),
            "##vso[task.complete result=Failed;]boom"
        );
    }

    #[test]
    fn agent_layer_maps_levels_to_commands() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber =
            tracing_subscriber::registry().with(AgentLayer::with_writer(move || writer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(status = 200, "http call completed");
            tracing::info!("release published");
            tracing::warn!("symbols not found");
            tracing::error!("upload failed\nsecond line");
        });

        assert_eq!(
            captured.lines(),
            vec![
                "##vso[task.debug]http call completed status=200",
                "release published",
                "##vso[task.logissue type=warning;]symbols not found",
                "##vso[task.logissue type=error;]upload failed%0Asecond line",
            ]
        );
    }
}
