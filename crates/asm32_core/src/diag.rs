use std::io::{self, Write};

use ariadne::{
    Color, ColorGenerator, Config, IndexType, Label, LabelAttach, Report, ReportKind, sources,
};

use thiserror::Error;

use crate::source::{FileId, SourceManager, Span};

/// Problems found while assembling a single source line. The `Display` text is
/// what the listing prints after the `E*****` / `W*****` marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("Illegal operands")]
    IllegalOperands,
    #[error("Operand too large")]
    OperandTooLarge,
    #[error("Illegal size")]
    IllegalSize,
    #[error("Value too large")]
    ValueOutOfRange,
    #[error("Unknown mnemonic")]
    UnknownMnemonic,
    #[error("Label required on SET or EQU")]
    LabelRequired,
    #[error("Illegal expression")]
    IllegalExpression,
    #[error("Comma expected")]
    CommaExpected,
    #[error("Unterminated string or character constant")]
    UnterminatedConstant,
    #[error("Label not allowed")]
    LabelNotAllowed,
    #[error("Illegal label")]
    IllegalLabel,
    #[error("Branch too far")]
    BranchUnreachable,
    #[error("Label multiply defined")]
    LabelMultiplyDefined,
    #[error("Instruction realigned on word address")]
    Realigned,
    #[error("Phasing Error (label has different value in pass 2)")]
    Phasing,
}

impl LineError {
    pub fn severity(self) -> Severity {
        match self {
            LineError::LabelMultiplyDefined | LineError::Realigned | LineError::Phasing => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }

    pub fn is_warning(self) -> bool {
        self.severity() == Severity::Warning
    }

    pub fn code(self) -> &'static str {
        match self {
            LineError::IllegalOperands => "E01",
            LineError::OperandTooLarge => "E02",
            LineError::IllegalSize => "E03",
            LineError::ValueOutOfRange => "E04",
            LineError::UnknownMnemonic => "E05",
            LineError::LabelRequired => "E06",
            LineError::IllegalExpression => "E07",
            LineError::CommaExpected => "E08",
            LineError::UnterminatedConstant => "E09",
            LineError::LabelNotAllowed => "E10",
            LineError::IllegalLabel => "E11",
            LineError::BranchUnreachable => "E12",
            LineError::LabelMultiplyDefined => "W01",
            LineError::Realigned => "W02",
            LineError::Phasing => "W03",
        }
    }

    /// Marker character used in the listing: `E` for errors, `W` for warnings.
    pub fn marker(self) -> char {
        if self.is_warning() { 'W' } else { 'E' }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug)]
pub struct DiagLabel {
    pub file: FileId,
    pub span: Span,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct Diag {
    pub severity: Severity,
    pub message: String,
    pub primary: DiagLabel,
    pub labels: Vec<DiagLabel>,
    pub help: Option<String>,
    pub code: Option<String>,
}

impl Diag {
    pub fn error(file: FileId, span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, file, span, message)
    }

    pub fn with_label(mut self, label: DiagLabel) -> Self {
        self.labels.push(label);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn from_line_error(file: FileId, span: Span, err: LineError) -> Self {
        Self::new(err.severity(), file, span, err.to_string()).with_code(err.code())
    }

    fn new(severity: Severity, file: FileId, span: Span, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            severity,
            primary: DiagLabel {
                file,
                span,
                message: message.clone(),
            },
            message,
            labels: Vec::new(),
            help: None,
            code: None,
        }
    }
}

pub fn count_severity(diags: &[Diag], severity: Severity) -> usize {
    diags.iter().filter(|diag| diag.severity == severity).count()
}

pub fn render_diags(source_manager: &SourceManager, diags: &[Diag]) -> io::Result<()> {
    let mut stderr = io::stderr();
    render_diags_to_writer(source_manager, diags, &mut stderr, true)
}

fn render_diags_to_writer<W: Write>(
    source_manager: &SourceManager,
    diags: &[Diag],
    mut writer: W,
    use_color: bool,
) -> io::Result<()> {
    let mut cache = sources(
        source_manager
            .files_iter()
            .map(|(id, file)| (id.0 as usize, file.text.clone())),
    );

    for diag in diags {
        let report_kind = match diag.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };
        let config = report_config(diag.severity, use_color);

        let mut colors = ColorGenerator::new();
        let mut report = Report::build(
            report_kind,
            (diag.primary.file.0 as usize, diag.primary.span.clone()),
        )
        .with_message(diag.message.clone())
        .with_config(config)
        .with_label(
            Label::new((diag.primary.file.0 as usize, diag.primary.span.clone()))
                .with_message(diag.primary.message.clone())
                .with_color(primary_color(diag.severity))
                .with_order(0),
        );

        if let Some(code) = &diag.code {
            report = report.with_code(code.clone());
        }

        for (idx, label) in diag.labels.iter().enumerate() {
            report = report.with_label(
                Label::new((label.file.0 as usize, label.span.clone()))
                    .with_message(label.message.clone())
                    .with_color(colors.next())
                    .with_order((idx + 1) as i32),
            );
        }

        if let Some(help) = &diag.help {
            report = report.with_help(help.clone());
        }

        report.finish().write(&mut cache, &mut writer)?;
    }

    Ok(())
}

fn primary_color(severity: Severity) -> Color {
    match severity {
        Severity::Error => Color::Red,
        Severity::Warning => Color::Yellow,
    }
}

fn report_config(severity: Severity, use_color: bool) -> Config {
    // Line spans are byte offsets into the normalized source text.
    let base = Config::default()
        .with_color(use_color)
        .with_index_type(IndexType::Byte)
        .with_label_attach(LabelAttach::Middle)
        .with_cross_gap(true)
        .with_tab_width(4);

    match severity {
        Severity::Error => base,
        Severity::Warning => base.with_compact(true),
    }
}
