use serde::Serialize;

/// 正在播放的媒体条目
///
/// `filename` 和 `basename` 在构造时从路径派生，会话期间不再变化
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaRef {
    /// 服务端文件路径
    pub path: String,
    /// 路径最后一段
    pub filename: String,
    /// 去掉扩展名的文件名
    pub basename: String,
}

impl MediaRef {
    /// 路径没有文件名 (空路径或以分隔符结尾) 时返回 None
    pub fn parse(path: &str) -> Option<Self> {
        let media = Self::new(path);
        if media.filename.trim().is_empty() {
            return None;
        }
        Some(media)
    }

    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let filename = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_string();
        let basename = match filename.rfind('.') {
            Some(idx) if idx > 0 => filename[..idx].to_string(),
            _ => filename.clone(),
        };

        Self {
            path,
            filename,
            basename,
        }
    }
}
