use std::path::Path;

use tickdown::Role;

/// Look up `username` in the role table: one `<username> <read|write>` pair
/// per line, whitespace-separated. The file is re-read on every connect so
/// the operator can edit it while the server runs. Unknown users and unknown
/// role words both come back as `None`.
pub fn lookup(path: &Path, username: &str) -> Option<Role> {
    let table = std::fs::read_to_string(path).ok()?;
    for line in table.lines() {
        let mut fields = line.split_whitespace();
        let (Some(user), Some(role)) = (fields.next(), fields.next()) else {
            continue;
        };
        if user == username {
            return role.parse().ok();
        }
    }
    None
}
