//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# proxydeck configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[server]
# host = "127.0.0.1"
# port = 3000
# handshake_timeout_secs = 10

[shell]
# program = ""             # empty: $SHELL or /bin/sh (powershell.exe on Windows)
# args = []
# working_directory = "/path/to/dir"
# login_shell = false
# term = "xterm-256color"
# cols = 80                # 1-1000
# rows = 24                # 1-1000

[shell.env]
# PORT = "8642"

[proxy]
# command = "antigravity-claude-proxy"
# host = "localhost"
# port = 8642
# api_key = "test"
# probe_timeout_ms = 3000
# health_interval_secs = 30   # 0 disables background probing
# auto_start = false
# initial_command = "antigravity-claude-proxy accounts"
# startup_banners = ["Server started successfully", "Server running at: http://localhost:"]

[automation]
# poll_interval_ms = 2000
# add_timeout_secs = 180
# remove_timeout_secs = 30
# interrupt_delay_ms = 500
# roster_timeout_secs = 10
# tail_capacity = 2000
# success_banner = "Successfully authenticated"
# repeat_prompt = "another account"

[logging]
# level = "INFO"           # TRACE, DEBUG, INFO, WARNING, ERROR
"##
    .to_string()
}
