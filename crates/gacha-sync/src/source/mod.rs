//! 上游 API 抽象 - 凭证校验、token 交换与抽卡历史查询
//!
//! 同步引擎只依赖这里的 trait；生产实现见 [`hypergryph`]，
//! 测试用脚本化的 FakeGachaSource。

pub mod hypergryph;

pub use hypergryph::{HypergryphSource, ARKNIGHTS_APP_CODE};

use async_trait::async_trait;
use gacha_protocol::{AccountInfo, CredentialToken, GachaEntry, Uid};
use serde::Deserialize;

use crate::error::Result;

/// 应用级 token（oauth grant 的产物，凭证换来的第一层 token）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppToken {
    pub hg_id: String,
    pub token: String,
}

/// 单账号会话 token
#[derive(Debug, Clone, Deserialize)]
pub struct U8Token {
    pub token: String,
}

/// 登录 cookie（ak-user-center 的内容）
#[derive(Debug, Clone)]
pub struct LoginCookie {
    pub content: String,
}

/// 卡池（独立维护各自的抽卡历史）
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Pool {
    pub id: String,
    pub name: String,
}

/// 翻页游标：上一页最后一条记录的 (gacha_ts, pos)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub gacha_ts: u64,
    pub pos: u32,
}

/// 一页抽卡历史（上游按时间新到旧返回）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GachaPage {
    pub list: Vec<GachaEntry>,
    pub has_more: bool,
}

/// 一个通行证下某应用的账号绑定
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppBinding {
    pub app_code: String,
    pub app_name: String,
    pub binding_list: Vec<AccountInfo>,
}

/// 上游 API 客户端
#[async_trait]
pub trait GachaSource: Send + Sync {
    /// 校验凭证是否有效
    async fn check_token(&self, token: &CredentialToken) -> Result<bool>;

    /// 用凭证换应用级 token
    async fn grant_app_token(&self, token: &CredentialToken) -> Result<AppToken>;

    /// 枚举通行证下的应用绑定
    async fn binding_list(&self, app_token: &AppToken) -> Result<Vec<AppBinding>>;

    /// 取指定账号的会话 token
    async fn u8_token_by_uid(&self, app_token: &AppToken, uid: &Uid) -> Result<U8Token>;

    /// 用会话 token 登录，换登录 cookie
    async fn login(&self, u8_token: &U8Token) -> Result<LoginCookie>;

    /// 枚举账号的卡池
    async fn pool_list(
        &self,
        uid: &Uid,
        u8_token: &U8Token,
        cookie: &LoginCookie,
    ) -> Result<Vec<Pool>>;

    /// 拉取一页抽卡历史；cursor 为 None 时从最新开始
    async fn gacha_history(
        &self,
        cookie: &LoginCookie,
        u8_token: &U8Token,
        uid: &Uid,
        pool: &Pool,
        size: u32,
        cursor: Option<PageCursor>,
    ) -> Result<GachaPage>;
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    /// 测试用：脚本化的上游
    ///
    /// 每个卡池预置一串页面，gacha_history 按调用顺序依次返回；
    /// 脚本耗尽后返回空页（has_more = false）。
    pub struct FakeGachaSource {
        account: AccountInfo,
        app_code: String,
        invalid_tokens: Mutex<HashSet<String>>,
        pools: Vec<Pool>,
        pages: Mutex<HashMap<String, Vec<GachaPage>>>,
        history_calls: Mutex<u32>,
    }

    impl FakeGachaSource {
        pub fn new(uid: &str, nick_name: &str) -> Self {
            Self {
                account: AccountInfo {
                    channel_master_id: 1,
                    channel_name: "官服".to_string(),
                    is_default: false,
                    is_deleted: false,
                    is_official: true,
                    nick_name: nick_name.to_string(),
                    uid: Uid::new(uid),
                },
                app_code: ARKNIGHTS_APP_CODE.to_string(),
                invalid_tokens: Mutex::new(HashSet::new()),
                pools: Vec::new(),
                pages: Mutex::new(HashMap::new()),
                history_calls: Mutex::new(0),
            }
        }

        /// 让指定凭证校验失败
        pub fn reject_token(self, token: &str) -> Self {
            self.invalid_tokens.lock().insert(token.to_string());
            self
        }

        /// 伪造一个非预期的应用绑定
        pub fn with_app_code(mut self, app_code: &str) -> Self {
            self.app_code = app_code.to_string();
            self
        }

        /// 为一个卡池预置页面脚本
        pub fn with_pool_pages(mut self, pool_id: &str, pool_name: &str, pages: Vec<GachaPage>) -> Self {
            self.pools.push(Pool {
                id: pool_id.to_string(),
                name: pool_name.to_string(),
            });
            self.pages.lock().insert(pool_id.to_string(), pages);
            self
        }

        pub fn history_calls(&self) -> u32 {
            *self.history_calls.lock()
        }

        /// 造一页脚本数据：每条记录按 (ts, pos) 区分
        pub fn page(entries: &[(u64, u32)], has_more: bool) -> GachaPage {
            GachaPage {
                list: entries
                    .iter()
                    .map(|&(gacha_ts, pos)| GachaEntry {
                        char_id: "char_002_amiya".to_string(),
                        char_name: "阿米娅".to_string(),
                        gacha_ts,
                        is_new: false,
                        pool_id: "NORM_1".to_string(),
                        pool_name: "标准寻访".to_string(),
                        pos,
                        rarity: 4,
                    })
                    .collect(),
                has_more,
            }
        }
    }

    #[async_trait]
    impl GachaSource for FakeGachaSource {
        async fn check_token(&self, token: &CredentialToken) -> Result<bool> {
            Ok(!self.invalid_tokens.lock().contains(&token.content))
        }

        async fn grant_app_token(&self, _token: &CredentialToken) -> Result<AppToken> {
            Ok(AppToken {
                hg_id: "hg-1".to_string(),
                token: "app-token".to_string(),
            })
        }

        async fn binding_list(&self, _app_token: &AppToken) -> Result<Vec<AppBinding>> {
            Ok(vec![AppBinding {
                app_code: self.app_code.clone(),
                app_name: "明日方舟".to_string(),
                binding_list: vec![self.account.clone()],
            }])
        }

        async fn u8_token_by_uid(&self, _app_token: &AppToken, _uid: &Uid) -> Result<U8Token> {
            Ok(U8Token {
                token: "u8-token".to_string(),
            })
        }

        async fn login(&self, _u8_token: &U8Token) -> Result<LoginCookie> {
            Ok(LoginCookie {
                content: "cookie".to_string(),
            })
        }

        async fn pool_list(
            &self,
            _uid: &Uid,
            _u8_token: &U8Token,
            _cookie: &LoginCookie,
        ) -> Result<Vec<Pool>> {
            Ok(self.pools.clone())
        }

        async fn gacha_history(
            &self,
            _cookie: &LoginCookie,
            _u8_token: &U8Token,
            _uid: &Uid,
            pool: &Pool,
            _size: u32,
            _cursor: Option<PageCursor>,
        ) -> Result<GachaPage> {
            *self.history_calls.lock() += 1;
            let mut pages = self.pages.lock();
            let script = pages.entry(pool.id.clone()).or_default();
            if script.is_empty() {
                Ok(GachaPage {
                    list: Vec::new(),
                    has_more: false,
                })
            } else {
                Ok(script.remove(0))
            }
        }
    }
}
