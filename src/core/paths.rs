//! 路径规范化
//!
//! 本地路径使用平台分隔符，远程路径统一为以 `/` 开头的 POSIX 路径。
//! 所有比较和 IO 之前都要先经过这里。

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// 隐藏文件（以 `.` 开头）不参与同步
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// 规范化远程路径：合并重复分隔符，处理 `.` / `..`，去掉末尾 `/`
///
/// 远程端是 POSIX 路径，`\` 是文件名的一部分。
pub fn normalize_remote(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    format!("/{}", parts.join("/"))
}

/// 拼接远程路径，`name` 原样作为最后一段
pub fn join_remote(base: &str, name: &str) -> String {
    let base = normalize_remote(base);
    if base == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// 远程路径的父目录，根目录没有父目录
pub fn parent_remote(path: &str) -> Option<String> {
    let path = normalize_remote(path);
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// 规范化本地路径：分隔符转为平台分隔符，去掉末尾分隔符
///
/// 只有 Windows 上 `\` 才是分隔符，其他平台上它可以出现在文件名里。
pub fn normalize_local(path: &str) -> String {
    let converted: String = path
        .chars()
        .map(|c| if is_local_separator(c) { MAIN_SEPARATOR } else { c })
        .collect();
    let trimmed = converted.trim_end_matches(MAIN_SEPARATOR);
    if trimmed.is_empty() {
        // 根目录
        return MAIN_SEPARATOR.to_string();
    }
    // Windows 盘符根目录需要保留分隔符，例如 C:\
    if trimmed.ends_with(':') {
        return format!("{}{}", trimmed, MAIN_SEPARATOR);
    }
    trimmed.to_string()
}

/// 拼接本地路径
pub fn join_local(base: &str, name: &str) -> String {
    let joined: PathBuf = Path::new(&normalize_local(base)).join(name);
    normalize_local(&joined.to_string_lossy())
}

/// 本地路径的父目录
pub fn parent_local(path: &str) -> Option<String> {
    Path::new(&normalize_local(path))
        .parent()
        .map(|p| normalize_local(&p.to_string_lossy()))
}

fn is_local_separator(c: char) -> bool {
    c == '/' || (cfg!(windows) && c == '\\')
}

/// 路径深度，用于由深到浅地删除目录
pub fn depth(path: &str) -> usize {
    path.chars().filter(|c| is_local_separator(*c)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_remote() {
        assert_eq!(normalize_remote(""), "/");
        assert_eq!(normalize_remote("/"), "/");
        assert_eq!(normalize_remote("sync//docs/"), "/sync/docs");
        assert_eq!(normalize_remote("/sync/./docs/../a.txt"), "/sync/a.txt");
    }

    #[test]
    fn test_join_and_parent_remote() {
        assert_eq!(join_remote("/", "a.txt"), "/a.txt");
        assert_eq!(join_remote("/sync/", "docs"), "/sync/docs");
        assert_eq!(parent_remote("/sync/docs/a.txt").as_deref(), Some("/sync/docs"));
        assert_eq!(parent_remote("/a.txt").as_deref(), Some("/"));
        assert_eq!(parent_remote("/"), None);
    }

    #[test]
    fn test_backslash_is_part_of_remote_name() {
        assert_eq!(join_remote("/sync", "report\\2024.txt"), "/sync/report\\2024.txt");
        assert_eq!(
            parent_remote("/sync/report\\2024.txt").as_deref(),
            Some("/sync")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_local_paths() {
        assert_eq!(normalize_local("/home/user/sync/"), "/home/user/sync");
        // Linux 上 `\` 是合法的文件名字符
        assert_eq!(normalize_local("/home\\user"), "/home\\user");
        assert_eq!(
            join_local("/home/user", "report\\2024.txt"),
            "/home/user/report\\2024.txt"
        );
        assert_eq!(join_local("/home/user", "a.txt"), "/home/user/a.txt");
        assert_eq!(parent_local("/home/user/a.txt").as_deref(), Some("/home/user"));
        assert_eq!(normalize_local("/"), "/");
    }

    #[test]
    fn test_hidden_and_depth() {
        assert!(is_hidden(".git"));
        assert!(!is_hidden("a.txt"));
        assert!(depth("/a/b/c") > depth("/a/b"));
    }
}
