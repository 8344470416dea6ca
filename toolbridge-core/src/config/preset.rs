//! Built-in launch recipes for well-known workers.

/// Launch recipe for a well-known worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub kind: &'static str,
    pub command: &'static str,
    pub args: &'static [&'static str],
    /// Variables that must be set in the server's `env` table or the process environment.
    pub required_env: &'static [&'static str],
    pub description: &'static str,
}

pub const PRESETS: [Preset; 3] = [
    Preset {
        name: "airbnb",
        kind: "airbnb",
        command: "npx",
        args: &["-y", "@openbnb/mcp-server-airbnb"],
        required_env: &[],
        description: "Airbnb listing search and listing details",
    },
    Preset {
        name: "tavily",
        kind: "generic",
        command: "npx",
        args: &["-y", "tavily-mcp"],
        required_env: &["TAVILY_API_KEY"],
        description: "Tavily web search and extraction",
    },
    Preset {
        name: "neo4j",
        kind: "generic",
        command: "npx",
        args: &["-y", "neo4j-mcp"],
        required_env: &["NEO4J_URI", "NEO4J_USERNAME", "NEO4J_PASSWORD"],
        description: "Neo4j graph database operations",
    },
];

pub fn find(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|preset| preset.name.eq_ignore_ascii_case(name))
}
