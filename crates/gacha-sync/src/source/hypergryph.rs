//! 鹰角官方接口的 GachaSource 实现
//!
//! 接口与载荷形状对齐官方 Web 端的行为：
//! - 通行证侧（as / binding-api）用 `status` 表示结果；
//! - 游戏侧（ak.hypergryph.com）用 `code` 表示结果；
//! - 登录 cookie 从 Set-Cookie 里取 `ak-user-center`。

use async_trait::async_trait;
use gacha_protocol::{CredentialToken, Uid};
use reqwest::header::SET_COOKIE;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{AppBinding, AppToken, GachaPage, GachaSource, LoginCookie, PageCursor, Pool, U8Token};
use crate::error::{GachaSyncError, Result};

/// 预期的应用命名空间：绑定列表中只认这个应用
pub const ARKNIGHTS_APP_CODE: &str = "arknights";

/// oauth grant 固定的调用方标识
const GRANT_APP_CODE: &str = "be36d44aa36bfb5b";

const CHECK_TOKEN_URL: &str = "https://as.hypergryph.com/user/info/v1/basic";
const GRANT_URL: &str = "https://as.hypergryph.com/user/oauth2/v2/grant";
const BINDING_LIST_URL: &str =
    "https://binding-api-account-prod.hypergryph.com/account/binding/v1/binding_list";
const U8_TOKEN_URL: &str =
    "https://binding-api-account-prod.hypergryph.com/account/binding/v1/u8_token_by_uid";
const LOGIN_URL: &str = "https://ak.hypergryph.com/user/api/role/login";
const POOL_LIST_URL: &str = "https://ak.hypergryph.com/user/api/inquiry/gacha/cate";
const HISTORY_URL: &str = "https://ak.hypergryph.com/user/api/inquiry/gacha/history";

/// 上游单次调用超时
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: i32,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct AppTokenResponse {
    status: i32,
    #[serde(default)]
    msg: String,
    data: Option<AppToken>,
}

#[derive(Debug, Deserialize)]
struct MultiAppBindingList {
    list: Vec<AppBinding>,
}

#[derive(Debug, Deserialize)]
struct BindingListResponse {
    status: i32,
    #[serde(default)]
    msg: String,
    data: Option<MultiAppBindingList>,
}

#[derive(Debug, Deserialize)]
struct U8TokenResponse {
    status: i32,
    #[serde(default)]
    msg: String,
    data: Option<U8Token>,
}

#[derive(Debug, Deserialize)]
struct PoolListResponse {
    code: i32,
    #[serde(default)]
    msg: String,
    data: Option<Vec<Pool>>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    code: i32,
    #[serde(default)]
    msg: String,
    data: Option<GachaPage>,
}

pub struct HypergryphSource {
    client: Client,
}

impl HypergryphSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(CALL_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

fn cookie_header(cookie: &LoginCookie) -> String {
    format!("ak-user-center={}", cookie.content)
}

#[async_trait]
impl GachaSource for HypergryphSource {
    async fn check_token(&self, token: &CredentialToken) -> Result<bool> {
        let resp: StatusResponse = self
            .client
            .get(CHECK_TOKEN_URL)
            .query(&[("token", token.content.as_str())])
            .send()
            .await?
            .json()
            .await?;
        Ok(resp.status == 0)
    }

    async fn grant_app_token(&self, token: &CredentialToken) -> Result<AppToken> {
        let resp: AppTokenResponse = self
            .client
            .post(GRANT_URL)
            .json(&json!({
                "appCode": GRANT_APP_CODE,
                "token": token.content,
                "type": 1,
            }))
            .send()
            .await?
            .json()
            .await?;
        if resp.status != 0 {
            return Err(GachaSyncError::Upstream(format!(
                "grant 失败: status={} msg={}",
                resp.status, resp.msg
            )));
        }
        resp.data
            .ok_or_else(|| GachaSyncError::Upstream("grant 响应缺少 data".to_string()))
    }

    async fn binding_list(&self, app_token: &AppToken) -> Result<Vec<AppBinding>> {
        let resp: BindingListResponse = self
            .client
            .get(BINDING_LIST_URL)
            .query(&[
                ("token", app_token.token.as_str()),
                ("appCode", ARKNIGHTS_APP_CODE),
            ])
            .send()
            .await?
            .json()
            .await?;
        if resp.status != 0 {
            return Err(GachaSyncError::Upstream(format!(
                "binding_list 失败: status={} msg={}",
                resp.status, resp.msg
            )));
        }
        Ok(resp.data.map(|d| d.list).unwrap_or_default())
    }

    async fn u8_token_by_uid(&self, app_token: &AppToken, uid: &Uid) -> Result<U8Token> {
        let resp: U8TokenResponse = self
            .client
            .post(U8_TOKEN_URL)
            .json(&json!({
                "token": app_token.token,
                "uid": uid.as_str(),
            }))
            .send()
            .await?
            .json()
            .await?;
        if resp.status != 0 {
            return Err(GachaSyncError::Upstream(format!(
                "u8_token_by_uid 失败: status={} msg={}",
                resp.status, resp.msg
            )));
        }
        resp.data
            .ok_or_else(|| GachaSyncError::Upstream("u8_token 响应缺少 data".to_string()))
    }

    async fn login(&self, u8_token: &U8Token) -> Result<LoginCookie> {
        let resp = self
            .client
            .post(LOGIN_URL)
            .json(&json!({
                "token": u8_token.token,
                "source_from": "",
                "share_type": "",
                "share_by": "",
            }))
            .send()
            .await?;
        // cookie 在响应头里，不在响应体里
        for value in resp.headers().get_all(SET_COOKIE) {
            let raw = value
                .to_str()
                .map_err(|e| GachaSyncError::Upstream(format!("Set-Cookie 不可读: {}", e)))?;
            for piece in raw.split(';') {
                let piece = piece.trim();
                if let Some(content) = piece.strip_prefix("ak-user-center=") {
                    return Ok(LoginCookie {
                        content: content.to_string(),
                    });
                }
            }
        }
        Err(GachaSyncError::Upstream(
            "登录响应里没有 ak-user-center cookie".to_string(),
        ))
    }

    async fn pool_list(
        &self,
        uid: &Uid,
        u8_token: &U8Token,
        cookie: &LoginCookie,
    ) -> Result<Vec<Pool>> {
        let resp: PoolListResponse = self
            .client
            .get(POOL_LIST_URL)
            .query(&[("uid", uid.as_str())])
            .header("x-role-token", &u8_token.token)
            .header("cookie", cookie_header(cookie))
            .send()
            .await?
            .json()
            .await?;
        if resp.code != 0 {
            return Err(GachaSyncError::Upstream(format!(
                "pool_list 失败: code={} msg={}",
                resp.code, resp.msg
            )));
        }
        Ok(resp.data.unwrap_or_default())
    }

    async fn gacha_history(
        &self,
        cookie: &LoginCookie,
        u8_token: &U8Token,
        uid: &Uid,
        pool: &Pool,
        size: u32,
        cursor: Option<PageCursor>,
    ) -> Result<GachaPage> {
        let mut query: Vec<(&str, String)> = vec![
            ("uid", uid.as_str().to_string()),
            ("category", pool.id.clone()),
            ("size", size.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("gachaTs", cursor.gacha_ts.to_string()));
            query.push(("pos", cursor.pos.to_string()));
        }
        debug!(uid = %uid, pool = %pool.id, ?cursor, "拉取抽卡历史");
        let resp: HistoryResponse = self
            .client
            .get(HISTORY_URL)
            .query(&query)
            .header("x-role-token", &u8_token.token)
            .header("cookie", cookie_header(cookie))
            .send()
            .await?
            .json()
            .await?;
        if resp.code != 0 {
            return Err(GachaSyncError::Upstream(format!(
                "gacha_history 失败: code={} msg={}",
                resp.code, resp.msg
            )));
        }
        resp.data
            .ok_or_else(|| GachaSyncError::Upstream("history 响应缺少 data".to_string()))
    }
}
