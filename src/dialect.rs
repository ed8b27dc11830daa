use crate::types::DriverKind;

/// Placeholder token style emitted when rendering bind slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` markers (SQLite family).
    Qmark,
    /// `%s` markers (Postgres/MySQL wire libraries).
    Format,
    /// Zero-based numbered markers like `:0`, `:1` (some proprietary drivers).
    Numbered,
}

/// Identifier quoting rule per backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierQuoting {
    /// ANSI `"name"`, embedded double quotes doubled.
    DoubleQuote,
    /// MySQL `` `name` ``, embedded backticks doubled.
    Backtick,
    /// SQL Server `[name]`, embedded `]` doubled.
    Bracket,
}

/// Per-backend rendering policy: placeholder token, identifier quoting, and
/// the type-alias table. Immutable; one instance per backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    placeholder: PlaceholderStyle,
    quoting: IdentifierQuoting,
    type_aliases: &'static [(&'static str, &'static str)],
}

const SQLITE_TYPES: &[(&str, &str)] = &[
    ("serial primary key", "INTEGER PRIMARY KEY"),
    ("serial", "INTEGER"),
];

const MSSQL_TYPES: &[(&str, &str)] = &[
    ("serial primary key", "INTEGER IDENTITY PRIMARY KEY"),
    ("serial", "INTEGER IDENTITY"),
];

impl Dialect {
    #[must_use]
    pub const fn new(
        placeholder: PlaceholderStyle,
        quoting: IdentifierQuoting,
        type_aliases: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            placeholder,
            quoting,
            type_aliases,
        }
    }

    #[must_use]
    pub const fn sqlite() -> Self {
        Self::new(
            PlaceholderStyle::Qmark,
            IdentifierQuoting::DoubleQuote,
            SQLITE_TYPES,
        )
    }

    /// `SERIAL PRIMARY KEY` is native DDL on Postgres, so no aliases.
    #[must_use]
    pub const fn postgres() -> Self {
        Self::new(PlaceholderStyle::Format, IdentifierQuoting::DoubleQuote, &[])
    }

    /// `SERIAL` is native on MySQL as well.
    #[must_use]
    pub const fn mysql() -> Self {
        Self::new(PlaceholderStyle::Format, IdentifierQuoting::Backtick, &[])
    }

    #[must_use]
    pub const fn mssql() -> Self {
        Self::new(
            PlaceholderStyle::Numbered,
            IdentifierQuoting::Bracket,
            MSSQL_TYPES,
        )
    }

    #[must_use]
    pub const fn for_kind(kind: DriverKind) -> Self {
        match kind {
            DriverKind::Sqlite => Self::sqlite(),
            DriverKind::Postgres => Self::postgres(),
            DriverKind::Mysql => Self::mysql(),
            DriverKind::Mssql => Self::mssql(),
        }
    }

    #[must_use]
    pub const fn placeholder_style(&self) -> PlaceholderStyle {
        self.placeholder
    }

    /// The bind marker for the `index`-th placeholder in a statement.
    /// Only the `Numbered` style actually uses the index.
    #[must_use]
    pub fn placeholder_token(&self, index: usize) -> String {
        match self.placeholder {
            PlaceholderStyle::Qmark => "?".to_string(),
            PlaceholderStyle::Format => "%s".to_string(),
            PlaceholderStyle::Numbered => format!(":{index}"),
        }
    }

    /// Quote `name` as an identifier, doubling the embedded closing quote
    /// character. No other validation is performed; the binder never inspects
    /// SQL beyond segmentation.
    #[must_use]
    pub fn quote_identifier(&self, name: &str) -> String {
        match self.quoting {
            IdentifierQuoting::DoubleQuote => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
            IdentifierQuoting::Backtick => {
                format!("`{}`", name.replace('`', "``"))
            }
            IdentifierQuoting::Bracket => {
                format!("[{}]", name.replace(']', "]]"))
            }
        }
    }

    /// Map a type alias to this backend's native spelling. Lookup is
    /// case-insensitive; unknown names pass through unmodified.
    #[must_use]
    pub fn adapt_type(&self, name: &str) -> String {
        let lowered = name.to_ascii_lowercase();
        self.type_aliases
            .iter()
            .find(|(alias, _)| *alias == lowered)
            .map_or_else(|| name.to_string(), |(_, native)| (*native).to_string())
    }
}
