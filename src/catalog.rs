//! # 服装目录模块
//!
//! ## 设计思路
//!
//! 目录由外部衣橱管理方提供，试穿链路只消费 `CatalogItem` 这一数据形状，
//! 从不抓取或存储目录本身。通过 `CatalogSource` trait 注入数据源，
//! 合成逻辑可以脱离任何具体目录独立测试。

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// 服装分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClothingCategory {
    Jeans,
    Shirts,
    Jackets,
    #[serde(rename = "T-Shirts")]
    TShirts,
    #[serde(rename = "Traditional Wear")]
    TraditionalWear,
}

impl ClothingCategory {
    pub const ALL: [ClothingCategory; 5] = [
        Self::Jeans,
        Self::Shirts,
        Self::Jackets,
        Self::TShirts,
        Self::TraditionalWear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jeans => "Jeans",
            Self::Shirts => "Shirts",
            Self::Jackets => "Jackets",
            Self::TShirts => "T-Shirts",
            Self::TraditionalWear => "Traditional Wear",
        }
    }

    /// 按显示名解析（忽略大小写与首尾空白）。
    pub fn parse(value: &str) -> Result<Self, AppError> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| AppError::Catalog(format!("未知的服装分类：{}", value)))
    }
}

/// 可试穿的目录单品。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    #[serde(alias = "name", alias = "displayName")]
    pub display_name: String,
    pub category: ClothingCategory,
    /// 外部托管的服装图片定位符。
    #[serde(alias = "imageUrl", alias = "imageLocator")]
    pub image_locator: String,
}

pub trait CatalogSource: Send + Sync {
    fn items(&self) -> &[CatalogItem];

    fn find(&self, id: &str) -> Option<&CatalogItem> {
        self.items().iter().find(|item| item.id == id)
    }

    fn by_category(&self, category: ClothingCategory) -> Vec<&CatalogItem> {
        self.items()
            .iter()
            .filter(|item| item.category == category)
            .collect()
    }
}

static DEFAULT_ITEMS: Lazy<Vec<CatalogItem>> = Lazy::new(|| {
    vec![
        CatalogItem {
            id: "1".to_string(),
            display_name: "Blue Denim Shirt".to_string(),
            category: ClothingCategory::Shirts,
            image_locator: "https://images.unsplash.com/photo-1596755094514-f87e34085b2c?w=200&h=200&fit=crop"
                .to_string(),
        },
        CatalogItem {
            id: "2".to_string(),
            display_name: "White T-Shirt".to_string(),
            category: ClothingCategory::TShirts,
            image_locator: "https://images.unsplash.com/photo-1521572163474-6864f9cf17ab?w=200&h=200&fit=crop"
                .to_string(),
        },
        CatalogItem {
            id: "3".to_string(),
            display_name: "Black Jacket".to_string(),
            category: ClothingCategory::Jackets,
            image_locator: "https://images.unsplash.com/photo-1551028719-00167b16eac5?w=200&h=200&fit=crop"
                .to_string(),
        },
    ]
});

/// 内存目录。
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    items: Vec<CatalogItem>,
}

impl InMemoryCatalog {
    /// 构建目录，`id` 重复时拒绝。
    pub fn new(items: Vec<CatalogItem>) -> Result<Self, AppError> {
        let mut seen = std::collections::HashSet::with_capacity(items.len());
        if let Some(dup) = items.iter().find(|item| !seen.insert(item.id.as_str())) {
            return Err(AppError::Catalog(format!("目录单品 id 重复：{}", dup.id)));
        }
        Ok(Self { items })
    }

    /// 内置的三件示例服装。
    pub fn with_default_items() -> Self {
        Self {
            items: DEFAULT_ITEMS.clone(),
        }
    }

    /// 从 JSON 数组解析目录，兼容前端字段名（`name` / `imageUrl`）。
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        let items: Vec<CatalogItem> = serde_json::from_str(json)
            .map_err(|e| AppError::Catalog(format!("目录 JSON 解析失败：{}", e)))?;
        log::debug!("📚 目录已加载 - 单品数: {}", items.len());
        Self::new(items)
    }
}

impl CatalogSource for InMemoryCatalog {
    fn items(&self) -> &[CatalogItem] {
        &self.items
    }
}
