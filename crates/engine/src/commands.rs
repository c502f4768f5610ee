use std::collections::BTreeMap;
use thiserror::Error;

use crate::jobs::OperationKind;
use crate::tools::{Tool, ToolCommand};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("no value bound for placeholder {{{0}}}")]
    Unbound(String),
}

/// Argument template for one tool-backed operation: a base argument list
/// plus an optional tail appended only when it applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTemplate {
    pub tool: Tool,
    pub base: &'static [&'static str],
    pub suffix: Option<&'static [&'static str]>,
}

const EXTRACT: CommandTemplate = CommandTemplate {
    tool: Tool::CcExtractor,
    base: &["-o", "{output}", "-tpage", "{page}", "{input}"],
    suffix: None,
};

const SLICE: CommandTemplate = CommandTemplate {
    tool: Tool::MkvMerge,
    base: &["-o", "{output}", "--split", "parts:{start}-{end}", "{input}"],
    suffix: None,
};

const COMPRESS: CommandTemplate = CommandTemplate {
    tool: Tool::HandBrake,
    base: &[
        "-e", "x264",
        "-q", "{quality}",
        "-a", "1",
        "-E", "ffaac",
        "-B", "160",
        "-6", "dpl2",
        "-R", "Auto",
        "-D", "0.0",
        "--audio-copy-mask", "aac,ac3,dtshd,dts,mp3",
        "--audio-fallback", "ffac3",
        "-f", "mkv",
        "--loose-anamorphic",
        "--modulus", "2",
        "-m",
        "--x264-preset", "veryfast",
        "--h264-profile", "main",
        "--h264-level", "4.0",
        "-s", "1",
        "-o", "{output}",
        "-i", "{input}",
    ],
    suffix: Some(&["--srt-file", "{subtitles}", "--srt-codeset", "UTF-8"]),
};

/// Template for an operation, or `None` when it runs in-process.
pub fn template_for(operation: OperationKind) -> Option<CommandTemplate> {
    match operation {
        OperationKind::ExtractCc => Some(EXTRACT),
        OperationKind::ShiftCc => None,
        OperationKind::Slice => Some(SLICE),
        OperationKind::Compress => Some(COMPRESS),
    }
}

/// Values for `{name}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: BTreeMap<&'static str, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(name, value.into());
        self
    }

    fn fill(&self, token: &str) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(token.len());
        let mut rest = token;
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}') else {
                break;
            };
            let name = &rest[open + 1..open + close];
            let value = self
                .values
                .get(name)
                .ok_or_else(|| TemplateError::Unbound(name.to_string()))?;
            out.push_str(&rest[..open]);
            out.push_str(value);
            rest = &rest[open + close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl CommandTemplate {
    /// Fill in the placeholders. The suffix is included when requested and
    /// the template has one.
    pub fn render(&self, bindings: &Bindings, with_suffix: bool) -> Result<ToolCommand, TemplateError> {
        let suffix = self.suffix.filter(|_| with_suffix).unwrap_or(&[]);
        let mut command = ToolCommand::new(self.tool.binary());
        for token in self.base.iter().chain(suffix) {
            command = command.arg(bindings.fill(token)?);
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_render() {
        let bindings = Bindings::new()
            .set("output", "/tmp/movietools/a_cut.mkv")
            .set("start", "00:10:00")
            .set("end", "00:20:00")
            .set("input", "/media/a.mkv");
        let cmd = template_for(OperationKind::Slice)
            .unwrap()
            .render(&bindings, false)
            .unwrap();
        assert_eq!(cmd.program, "mkvmerge");
        assert_eq!(
            cmd.args,
            vec![
                "-o",
                "/tmp/movietools/a_cut.mkv",
                "--split",
                "parts:00:10:00-00:20:00",
                "/media/a.mkv"
            ]
        );
    }

    #[test]
    fn test_compress_suffix_is_optional() {
        let bindings = Bindings::new()
            .set("quality", "23")
            .set("output", "out.mkv")
            .set("input", "in.mkv");
        let template = template_for(OperationKind::Compress).unwrap();

        let plain = template.render(&bindings, false).unwrap();
        assert_eq!(plain.value_of("-q"), Some("23"));
        assert_eq!(plain.args.last().map(String::as_str), Some("in.mkv"));

        // The suffix needs its own binding
        assert_eq!(
            template.render(&bindings, true).unwrap_err(),
            TemplateError::Unbound("subtitles".to_string())
        );
        let with_srt = template
            .render(&bindings.clone().set("subtitles", "in.srt"), true)
            .unwrap();
        assert_eq!(with_srt.value_of("--srt-file"), Some("in.srt"));
    }

    #[test]
    fn test_shift_has_no_template() {
        assert!(template_for(OperationKind::ShiftCc).is_none());
        assert_eq!(template_for(OperationKind::ExtractCc).unwrap().tool, Tool::CcExtractor);
    }
}
