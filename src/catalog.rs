//! Base styles and the static per-style option templates.
//!
//! The table below is a representative subset of clang-format's options with
//! the defaults each built-in style assigns them. Declaration order is the
//! order in which the detector searches, so options with wide effects
//! (indentation, column limit, braces) come before local ones.

use crate::options::{FormatOption, Observation, OptionValue, SearchSpace, ToggleFlag};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named clang-format preset, or `Custom` for "no base style".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatStyle {
    Llvm,
    Google,
    Chromium,
    Mozilla,
    #[value(name = "webkit")]
    WebKit,
    Microsoft,
    /// No `BasedOnStyle` line; clang-format falls back to its LLVM defaults.
    Custom,
}

impl FormatStyle {
    /// Every style in declaration order, `Custom` last.
    pub const ALL: [FormatStyle; 7] = [
        Self::Llvm,
        Self::Google,
        Self::Chromium,
        Self::Mozilla,
        Self::WebKit,
        Self::Microsoft,
        Self::Custom,
    ];

    /// The `BasedOnStyle` value, `None` for `Custom`.
    pub fn based_on(self) -> Option<&'static str> {
        match self {
            Self::Llvm => Some("LLVM"),
            Self::Google => Some("Google"),
            Self::Chromium => Some("Chromium"),
            Self::Mozilla => Some("Mozilla"),
            Self::WebKit => Some("WebKit"),
            Self::Microsoft => Some("Microsoft"),
            Self::Custom => None,
        }
    }

    /// Parse a `BasedOnStyle` value, ignoring case.
    pub fn from_based_on(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|style| style.based_on().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }

    fn index(self) -> usize {
        match self {
            Self::Llvm => 0,
            Self::Google => 1,
            Self::Chromium => 2,
            Self::Mozilla => 3,
            Self::WebKit => 4,
            Self::Microsoft => 5,
            Self::Custom => 6,
        }
    }
}

impl fmt::Display for FormatStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.based_on().unwrap_or("Custom"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Option Table
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum RowKind {
    Toggle,
    Input(SearchSpace),
    /// Flag names; defaults are space-separated `true`/`false` in flag order.
    MultipleToggle(&'static [&'static str]),
    MultipleInput,
}

struct OptionRow {
    name: &'static str,
    kind: RowKind,
    /// Defaults in `FormatStyle::ALL` order. `Custom` mirrors LLVM.
    defaults: [&'static str; 7],
}

const fn probes(values: &'static [&'static str]) -> RowKind {
    RowKind::Input(SearchSpace {
        probes: values,
        observe: None,
    })
}

const fn same(value: &'static str) -> [&'static str; 7] {
    [value; 7]
}

const BRACE_FLAGS: &[&str] = &[
    "AfterCaseLabel",
    "AfterClass",
    "AfterEnum",
    "AfterFunction",
    "AfterNamespace",
    "AfterStruct",
    "AfterUnion",
    "AfterExternBlock",
    "BeforeCatch",
    "BeforeElse",
    "IndentBraces",
    "SplitEmptyFunction",
];

const BRACES_LLVM: &str = "false false false false false false false false false false false true";
const BRACES_MOZILLA: &str = "false true true true false true true true false false false true";
const BRACES_WEBKIT: &str = "false false false true false false false false false false false true";
const BRACES_MICROSOFT: &str = "false true true true true true false true true true false true";

const INCLUDES_LLVM: &str = "  - Regex: '^\"(llvm|llvm-c|clang|clang-c)/'
    Priority: 2
  - Regex: '^(<|\"(gtest|gmock|isl|json)/)'
    Priority: 3
  - Regex: '.*'
    Priority: 1";

const INCLUDES_GOOGLE: &str = "  - Regex: '^<ext/.*\\.h>'
    Priority: 2
  - Regex: '^<.*\\.h>'
    Priority: 1
  - Regex: '^<.*'
    Priority: 2
  - Regex: '.*'
    Priority: 3";

#[rustfmt::skip]
const OPTION_TABLE: &[OptionRow] = &[
    OptionRow { name: "IndentWidth", kind: probes(&["2", "3", "4", "8"]),
        defaults: ["2", "2", "2", "2", "4", "4", "2"] },
    OptionRow { name: "UseTab", kind: probes(&["Never", "ForIndentation", "Always"]),
        defaults: same("Never") },
    OptionRow { name: "TabWidth", kind: probes(&["4", "8"]),
        defaults: ["8", "8", "8", "8", "8", "4", "8"] },
    OptionRow { name: "ColumnLimit",
        kind: RowKind::Input(SearchSpace { probes: &["80", "100", "120", "0"], observe: Some(Observation::WidestLine) }),
        defaults: ["80", "80", "80", "80", "0", "120", "80"] },
    OptionRow { name: "ContinuationIndentWidth", kind: probes(&["2", "4", "8"]),
        defaults: ["4", "4", "4", "2", "4", "4", "4"] },
    OptionRow { name: "BreakBeforeBraces",
        kind: probes(&["Attach", "Linux", "Mozilla", "Stroustrup", "Allman", "WebKit", "Custom"]),
        defaults: ["Attach", "Attach", "Attach", "Mozilla", "WebKit", "Custom", "Attach"] },
    OptionRow { name: "BraceWrapping", kind: RowKind::MultipleToggle(BRACE_FLAGS),
        defaults: [BRACES_LLVM, BRACES_LLVM, BRACES_LLVM, BRACES_MOZILLA, BRACES_WEBKIT, BRACES_MICROSOFT, BRACES_LLVM] },
    OptionRow { name: "AccessModifierOffset", kind: probes(&["-4", "-2", "-1", "0"]),
        defaults: ["-2", "-1", "-1", "-2", "-4", "-2", "-2"] },
    OptionRow { name: "IndentCaseLabels", kind: RowKind::Toggle,
        defaults: ["false", "true", "true", "true", "false", "false", "false"] },
    OptionRow { name: "NamespaceIndentation", kind: probes(&["None", "Inner", "All"]),
        defaults: ["None", "None", "None", "None", "Inner", "None", "None"] },
    OptionRow { name: "IndentPPDirectives", kind: probes(&["None", "AfterHash", "BeforeHash"]),
        defaults: same("None") },
    OptionRow { name: "IndentWrappedFunctionNames", kind: RowKind::Toggle,
        defaults: same("false") },
    OptionRow { name: "PointerAlignment", kind: probes(&["Left", "Right", "Middle"]),
        defaults: ["Right", "Left", "Left", "Left", "Left", "Right", "Right"] },
    OptionRow { name: "DerivePointerAlignment", kind: RowKind::Toggle,
        defaults: ["false", "true", "false", "false", "false", "false", "false"] },
    OptionRow { name: "AlignAfterOpenBracket", kind: probes(&["Align", "DontAlign", "AlwaysBreak"]),
        defaults: ["Align", "Align", "Align", "Align", "DontAlign", "Align", "Align"] },
    OptionRow { name: "AlignOperands", kind: probes(&["DontAlign", "Align", "AlignAfterOperator"]),
        defaults: ["Align", "Align", "Align", "Align", "DontAlign", "Align", "Align"] },
    OptionRow { name: "AlignEscapedNewlines", kind: probes(&["DontAlign", "Left", "Right"]),
        defaults: ["Right", "Left", "Left", "Right", "Right", "Right", "Right"] },
    OptionRow { name: "AlignTrailingComments", kind: RowKind::Toggle,
        defaults: ["true", "true", "true", "true", "false", "true", "true"] },
    OptionRow { name: "AllowShortBlocksOnASingleLine", kind: probes(&["Never", "Empty", "Always"]),
        defaults: ["Never", "Never", "Never", "Never", "Empty", "Never", "Never"] },
    OptionRow { name: "AllowShortCaseLabelsOnASingleLine", kind: RowKind::Toggle,
        defaults: same("false") },
    OptionRow { name: "AllowShortFunctionsOnASingleLine", kind: probes(&["None", "Empty", "Inline", "All"]),
        defaults: ["All", "All", "Inline", "Inline", "All", "None", "All"] },
    OptionRow { name: "AllowShortIfStatementsOnASingleLine", kind: probes(&["Never", "WithoutElse", "AllIfsAndElses"]),
        defaults: ["Never", "WithoutElse", "Never", "Never", "Never", "Never", "Never"] },
    OptionRow { name: "AllowShortLoopsOnASingleLine", kind: RowKind::Toggle,
        defaults: ["false", "true", "false", "false", "false", "false", "false"] },
    OptionRow { name: "AlwaysBreakTemplateDeclarations", kind: probes(&["No", "MultiLine", "Yes"]),
        defaults: ["MultiLine", "Yes", "Yes", "Yes", "MultiLine", "MultiLine", "MultiLine"] },
    OptionRow { name: "BinPackArguments", kind: RowKind::Toggle,
        defaults: ["true", "true", "true", "false", "true", "true", "true"] },
    OptionRow { name: "BinPackParameters", kind: RowKind::Toggle,
        defaults: ["true", "true", "false", "false", "true", "true", "true"] },
    OptionRow { name: "BreakBeforeBinaryOperators", kind: probes(&["None", "NonAssignment", "All"]),
        defaults: ["None", "None", "None", "None", "All", "None", "None"] },
    OptionRow { name: "BreakConstructorInitializers", kind: probes(&["BeforeColon", "BeforeComma", "AfterColon"]),
        defaults: ["BeforeColon", "BeforeColon", "BeforeColon", "BeforeComma", "BeforeComma", "BeforeColon", "BeforeColon"] },
    OptionRow { name: "Cpp11BracedListStyle", kind: RowKind::Toggle,
        defaults: ["true", "true", "true", "false", "false", "true", "true"] },
    OptionRow { name: "FixNamespaceComments", kind: RowKind::Toggle,
        defaults: ["true", "true", "true", "false", "false", "true", "true"] },
    OptionRow { name: "KeepEmptyLinesAtTheStartOfBlocks", kind: RowKind::Toggle,
        defaults: ["true", "false", "false", "true", "true", "true", "true"] },
    OptionRow { name: "MaxEmptyLinesToKeep", kind: probes(&["1", "2"]),
        defaults: same("1") },
    OptionRow { name: "ReflowComments", kind: RowKind::Toggle,
        defaults: same("true") },
    OptionRow { name: "SpacesBeforeTrailingComments", kind: probes(&["1", "2", "3"]),
        defaults: ["1", "2", "2", "1", "1", "1", "1"] },
    OptionRow { name: "SpaceAfterCStyleCast", kind: RowKind::Toggle,
        defaults: same("false") },
    OptionRow { name: "SpaceAfterTemplateKeyword", kind: RowKind::Toggle,
        defaults: ["true", "true", "true", "false", "true", "true", "true"] },
    OptionRow { name: "SpaceBeforeAssignmentOperators", kind: RowKind::Toggle,
        defaults: same("true") },
    OptionRow { name: "SpaceBeforeParens", kind: probes(&["Never", "ControlStatements", "Always"]),
        defaults: same("ControlStatements") },
    OptionRow { name: "SpacesInParentheses", kind: RowKind::Toggle,
        defaults: same("false") },
    OptionRow { name: "IncludeBlocks", kind: probes(&["Preserve", "Merge", "Regroup"]),
        defaults: ["Preserve", "Regroup", "Preserve", "Preserve", "Preserve", "Preserve", "Preserve"] },
    OptionRow { name: "SortIncludes", kind: probes(&["Never", "CaseSensitive", "CaseInsensitive"]),
        defaults: same("CaseSensitive") },
    OptionRow { name: "IncludeCategories", kind: RowKind::MultipleInput,
        defaults: [INCLUDES_LLVM, INCLUDES_GOOGLE, INCLUDES_GOOGLE, INCLUDES_LLVM, INCLUDES_LLVM, INCLUDES_LLVM, INCLUDES_LLVM] },
    OptionRow { name: "Standard", kind: probes(&[]),
        defaults: ["Latest", "Auto", "Auto", "Latest", "Latest", "Latest", "Latest"] },
];

impl OptionRow {
    fn template(&self, style: FormatStyle) -> FormatOption {
        let default = self.defaults[style.index()];
        let value = match self.kind {
            RowKind::Toggle => OptionValue::Toggle(default == "true"),
            RowKind::Input(search) => {
                return FormatOption::new(self.name, OptionValue::Input(default.to_string()))
                    .with_search(search);
            }
            RowKind::MultipleToggle(flags) => OptionValue::MultipleToggle(
                flags
                    .iter()
                    .zip(default.split_whitespace())
                    .map(|(name, value)| ToggleFlag::new(*name, value == "true"))
                    .collect(),
            ),
            RowKind::MultipleInput => OptionValue::MultipleInput(default.to_string()),
        };
        FormatOption::new(self.name, value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable option templates for every style.
///
/// Built once and passed explicitly; detection runs clone what they mutate.
#[derive(Debug, Clone)]
pub struct Catalog {
    templates: Vec<Vec<FormatOption>>,
}

impl Catalog {
    pub fn builtin() -> Self {
        let templates = FormatStyle::ALL
            .into_iter()
            .map(|style| OPTION_TABLE.iter().map(|row| row.template(style)).collect())
            .collect();
        Self { templates }
    }

    /// The style's default options, all disabled, in search order.
    pub fn templates(&self, style: FormatStyle) -> &[FormatOption] {
        self.templates
            .get(style.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// An owned, mutable copy of the style's templates.
    pub fn working_set(&self, style: FormatStyle) -> Vec<FormatOption> {
        self.templates(style).to_vec()
    }

    pub fn find(&self, style: FormatStyle, name: &str) -> Option<&FormatOption> {
        self.templates(style).iter().find(|option| option.name == name)
    }
}
