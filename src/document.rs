//! 加载结果：由有序页面组成的可渲染文档

// 第三方crate导入
use url::Url;

/// 单个页面：标题、内容引用和序号
///
/// 内容引用可以指向缓存中的本地文件，也可以指向远程URL。标题不要求唯一。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    title: String,
    uri: Url,
    index: usize,
}

impl Page {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// 页面在文档中的位置
    pub fn index(&self) -> usize {
        self.index
    }
}

/// 完整物化的加载结果，构造后不可变
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pages: Vec<Page>,
}

impl Document {
    /// 按给定顺序构造文档，页面序号即其在序列中的位置
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = (S, Url)>,
        S: Into<String>,
    {
        let pages = parts
            .into_iter()
            .enumerate()
            .map(|(index, (title, uri))| Page {
                title: title.into(),
                uri,
                index,
            })
            .collect();

        Self { pages }
    }

    /// 只有一页的文档
    pub fn single(title: &str, uri: Url) -> Self {
        Self::from_parts([(title, uri)])
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn into_pages(self) -> Vec<Page> {
        self.pages
    }
}
