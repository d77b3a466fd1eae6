//! Nginx server blocks.

use super::CommandSpec;
use std::fs;
use std::io;
use std::path::Path;

/// First line of every server block siteprov writes.
pub const MANAGED_HEADER: &str = "# Managed by siteprov";

/// Renders the server block for a WordPress site.
#[must_use]
pub fn server_block(domain: &str, root: &Path, fpm_socket: &Path) -> String {
    format!(
        r"{MANAGED_HEADER}
server {{
    listen 80;
    server_name {domain};
    root {root};
    index index.php;

    client_max_body_size 64M;

    location / {{
        try_files $uri $uri/ /index.php?$args;
    }}

    location ~ \.php$ {{
        include fastcgi.conf;
        fastcgi_pass unix:{socket};
    }}

    location ~ /\.ht {{
        deny all;
    }}
}}
",
        root = root.display(),
        socket = fpm_socket.display(),
    )
}

/// `nginx -t`.
#[must_use]
pub fn test_config() -> CommandSpec {
    CommandSpec::new("nginx").arg("-t")
}

/// Links `available` into `sites-enabled`.
///
/// An existing link to the same target is left alone.
pub fn enable(available: &Path, enabled: &Path) -> io::Result<bool> {
    if let Ok(target) = fs::read_link(enabled) {
        if target == available {
            return Ok(false);
        }
    }
    if let Some(parent) = enabled.parent() {
        fs::create_dir_all(parent)?;
    }
    symlink(available, enabled)?;
    Ok(true)
}

/// Removes the `sites-enabled` link if present.
pub fn disable(enabled: &Path) -> io::Result<bool> {
    match fs::remove_file(enabled) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Returns true if the site is linked into `sites-enabled`.
#[must_use]
pub fn is_enabled(enabled: &Path) -> bool {
    fs::symlink_metadata(enabled).is_ok()
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    fs::copy(original, link).map(drop)
}
