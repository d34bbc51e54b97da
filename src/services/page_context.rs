//! 页面上下文识别
//!
//! 从地址栏参数与页面文字中读出题目、考试、学生信息，组成评分上下文。

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::infrastructure::{find_everywhere, DocContext, PageSurface};
use crate::models::platform::PlatformProfile;
use crate::models::scoring::ScoringContext;

const QUESTION_KEYS: &[&str] = &["questionId", "question_id", "qid", "itemId", "topicId"];
const EXAM_KEYS: &[&str] = &["examId", "exam_id", "testId", "paperId"];

/// 从地址中读出 (题目编号, 考试编号)
///
/// 单页应用常把参数放在 `#/path?key=value` 里，两处都会查找。
pub fn ids_from_url(href: &str) -> (Option<String>, Option<String>) {
    let Ok(url) = Url::parse(href) else {
        return (None, None);
    };

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if let Some((_, fragment_query)) = url.fragment().and_then(|f| f.split_once('?')) {
        pairs.extend(
            url::form_urlencoded::parse(fragment_query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }

    let lookup = |keys: &[&str]| {
        keys.iter().find_map(|key| {
            pairs
                .iter()
                .find(|(k, v)| k.eq_ignore_ascii_case(key) && !v.trim().is_empty())
                .map(|(_, v)| v.trim().to_string())
        })
    };

    (lookup(QUESTION_KEYS), lookup(EXAM_KEYS))
}

static STUDENT_NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:姓名|学生)\s*[:：]\s*([\p{Han}A-Za-z·]{2,20})").ok());

/// 从页面文字中识别“姓名：张三”
pub fn student_name_from_text(text: &str) -> Option<String> {
    STUDENT_NAME_PATTERN
        .as_ref()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// 读取当前页面的评分上下文
pub async fn read_context(surface: &dyn PageSurface, profile: &PlatformProfile) -> ScoringContext {
    let (question_id, exam_id) = match surface.location().await {
        Ok(location) => ids_from_url(&location.href),
        Err(e) => {
            debug!("读取页面地址失败: {}", e);
            (None, None)
        }
    };

    ScoringContext {
        question_id,
        exam_id,
        student_name: read_student_name(surface, profile).await,
        platform: profile.id,
        platform_label: profile.label.clone(),
    }
}

async fn read_student_name(surface: &dyn PageSurface, profile: &PlatformProfile) -> Option<String> {
    for selector in &profile.student_name_selectors {
        let Ok(elements) = find_everywhere(surface, selector).await else {
            continue;
        };
        for element in elements {
            if let Ok(info) = surface.describe(&element).await {
                let name = info.text.trim();
                if !name.is_empty() {
                    return Some(student_name_from_text(name).unwrap_or_else(|| name.to_string()));
                }
            }
        }
    }

    let text = surface.text_content(&DocContext::main()).await.ok()?;
    student_name_from_text(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_from_query() {
        let (question, exam) =
            ids_from_url("https://www.zhixue.com/marking/index?examId=E01&questionId=Q17");
        assert_eq!(question.as_deref(), Some("Q17"));
        assert_eq!(exam.as_deref(), Some("E01"));
    }

    #[test]
    fn test_ids_from_hash_route() {
        let (question, exam) = ids_from_url("https://mark.yunxiao.com/#/marking?qid=88&testId=t-2");
        assert_eq!(question.as_deref(), Some("88"));
        assert_eq!(exam.as_deref(), Some("t-2"));
    }

    #[test]
    fn test_ids_missing() {
        assert_eq!(ids_from_url("https://example.com/"), (None, None));
        assert_eq!(ids_from_url("not a url"), (None, None));
    }

    #[test]
    fn test_student_name_from_text() {
        assert_eq!(
            student_name_from_text("考号 102 姓名：李小明 班级 3").as_deref(),
            Some("李小明")
        );
        assert_eq!(student_name_from_text("无相关信息"), None);
        assert_eq!(student_name_from_text("学生: Tom").as_deref(), Some("Tom"));
        assert!(STUDENT_NAME_PATTERN.is_some());
    }
}
