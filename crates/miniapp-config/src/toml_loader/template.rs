//! Default TOML config template with inline documentation comments.

pub(crate) fn default_config_toml() -> String {
    r##"# Mini-app host configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[app]
# app_id = ""
# version_id = ""
# title = ""

[navigation]
# visibility = "never"          # never, auto, always
# external_schemes = ["tel"]    # handed to the OS, never loaded in the page

[server]
# bundles_dir = ""              # holds {app_id}/{version_id}/...
# host = "127.0.0.1"            # must be loopback
# port = 0                      # 0 = ephemeral
# secure = true                 # TLS with a per-process self-issued certificate

[fetch]
# timeout_secs = 30             # 1-300
# entry_document = "index.html"
"##
    .to_string()
}
