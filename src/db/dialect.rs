use serde::{Deserialize, Serialize};

/// SQL flavour the stores render their statements in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Sqlite,
    Mysql,
}

impl Dialect {
    /// Picks a dialect from a driver name or connection url.
    ///
    /// Anything that is neither `postgres*` nor `sqlite*` is treated as MySQL,
    /// which shares SQLite's `?` placeholders.
    pub fn from_driver_name(name: &str) -> Self {
        if name.starts_with("postgres") {
            Dialect::Postgres
        } else if name.starts_with("sqlite") {
            Dialect::Sqlite
        } else {
            Dialect::Mysql
        }
    }

    /// Placeholder for the `index`-th (1-based) bound parameter.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite | Dialect::Mysql => "?".to_string(),
        }
    }

    /// Rewrites a statement written with `?` placeholders into this dialect.
    pub fn render(self, template: &str) -> String {
        match self {
            Dialect::Sqlite | Dialect::Mysql => template.to_string(),
            Dialect::Postgres => {
                let mut out = String::with_capacity(template.len() + 8);
                let mut index = 0;
                for ch in template.chars() {
                    if ch == '?' {
                        index += 1;
                        out.push_str(&self.placeholder(index));
                    } else {
                        out.push(ch);
                    }
                }
                out
            }
        }
    }

    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{ident}`"),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{ident}\""),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
        };
        f.write_str(name)
    }
}
