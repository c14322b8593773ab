//! Messages carried on the gamification and notification queues.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::UnknownLabel;

/// Stable identifier for platform users.
pub type UserId = Uuid;

/// Role tiers. Only the lowest tier accretes XP and stars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular employee; the only tier that earns rewards.
    Colaborador,
    /// Manager.
    Gestor,
    /// Platform administrator.
    SuperAdmin,
}

impl Role {
    /// Storage and wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Colaborador => "colaborador",
            Self::Gestor => "gestor",
            Self::SuperAdmin => "super_admin",
        }
    }

    /// Whether users holding this role accrue XP and stars.
    #[must_use]
    pub const fn earns_rewards(self) -> bool {
        matches!(self, Self::Colaborador)
    }
}

impl Display for Role {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "colaborador" => Ok(Self::Colaborador),
            "gestor" => Ok(Self::Gestor),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(UnknownLabel {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// XP and stars granted for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    /// Experience points.
    pub xp: u32,
    /// Redeemable stars.
    pub stars: u32,
}

/// Actions that earn gamification rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Daily mood check-in.
    #[serde(rename = "registrar_humor")]
    MoodCheckIn,
    /// Feedback sent to a colleague.
    #[serde(rename = "dar_feedback")]
    GiveFeedback,
    /// Survey answered.
    #[serde(rename = "responder_pesquisa")]
    AnswerSurvey,
    /// Training (course) completed.
    #[serde(rename = "concluir_treinamento")]
    CompleteTraining,
    /// Attendance confirmed at a company event.
    #[serde(rename = "participar_evento")]
    AttendEvent,
    /// Post published on the social feed.
    #[serde(rename = "criar_post")]
    CreatePost,
    /// Comment left on a feed post.
    #[serde(rename = "comentar_post")]
    CommentPost,
    /// Reaction added to a feed post.
    #[serde(rename = "reagir_post")]
    ReactToPost,
    /// Personal goal completed.
    #[serde(rename = "concluir_meta")]
    CompleteGoal,
}

impl Action {
    /// Every known action.
    pub const ALL: [Self; 9] = [
        Self::MoodCheckIn,
        Self::GiveFeedback,
        Self::AnswerSurvey,
        Self::CompleteTraining,
        Self::AttendEvent,
        Self::CreatePost,
        Self::CommentPost,
        Self::ReactToPost,
        Self::CompleteGoal,
    ];

    /// Storage and wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MoodCheckIn => "registrar_humor",
            Self::GiveFeedback => "dar_feedback",
            Self::AnswerSurvey => "responder_pesquisa",
            Self::CompleteTraining => "concluir_treinamento",
            Self::AttendEvent => "participar_evento",
            Self::CreatePost => "criar_post",
            Self::CommentPost => "comentar_post",
            Self::ReactToPost => "reagir_post",
            Self::CompleteGoal => "concluir_meta",
        }
    }

    /// Human-readable label shown in notifications.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MoodCheckIn => "registrar seu humor",
            Self::GiveFeedback => "dar feedback",
            Self::AnswerSurvey => "responder uma pesquisa",
            Self::CompleteTraining => "concluir um treinamento",
            Self::AttendEvent => "participar de um evento",
            Self::CreatePost => "publicar no feed",
            Self::CommentPost => "comentar no feed",
            Self::ReactToPost => "reagir a uma publicação",
            Self::CompleteGoal => "concluir uma meta",
        }
    }

    /// Reward handlers grant when they have no resource-specific amount.
    ///
    /// Training completion is a flat amount regardless of the quiz score.
    #[must_use]
    pub const fn default_reward(self) -> Reward {
        let (xp, stars) = match self {
            Self::MoodCheckIn => (10, 1),
            Self::GiveFeedback => (30, 3),
            Self::AnswerSurvey => (50, 5),
            Self::CompleteTraining => (100, 10),
            Self::AttendEvent => (40, 4),
            Self::CreatePost => (15, 1),
            Self::CommentPost => (5, 0),
            Self::ReactToPost => (2, 0),
            Self::CompleteGoal => (80, 8),
        };
        Reward { xp, stars }
    }
}

impl Display for Action {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| UnknownLabel {
                kind: "action",
                value: value.to_string(),
            })
    }
}

/// Opaque key/value bag describing what triggered an award (kept for audit).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AwardContext(Map<String, Value>);

impl AwardContext {
    /// Empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a single entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the context carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert into a JSON object value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for AwardContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Request to credit XP and stars to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamificationEvent {
    /// Target user.
    pub user_id: UserId,
    /// Role the producer saw; informational only, the worker re-checks the stored role.
    pub role: Role,
    /// Action that earned the reward.
    pub action: Action,
    /// XP to credit.
    pub xp: u32,
    /// Stars to credit.
    pub stars: u32,
    /// Audit context supplied by the producer.
    #[serde(default)]
    pub context: AwardContext,
    /// When the producer emitted the event.
    pub emitted_at: DateTime<Utc>,
}

impl GamificationEvent {
    /// Build an event stamped with the current time.
    #[must_use]
    pub fn new(
        user_id: UserId,
        role: Role,
        action: Action,
        reward: Reward,
        context: AwardContext,
    ) -> Self {
        Self {
            user_id,
            role,
            action,
            xp: reward.xp,
            stars: reward.stars,
            context,
            emitted_at: Utc::now(),
        }
    }
}

/// Categories of user-visible notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// XP credited.
    XpGained,
    /// Level increased.
    LevelUp,
    /// Achievement unlocked.
    Achievement,
    /// Stars redeemed for a reward.
    RewardRedeemed,
    /// Generic platform message.
    System,
}

impl NotificationKind {
    /// Storage and wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::XpGained => "xp_gained",
            Self::LevelUp => "level_up",
            Self::Achievement => "achievement",
            Self::RewardRedeemed => "reward_redeemed",
            Self::System => "system",
        }
    }
}

impl Display for NotificationKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "xp_gained" => Ok(Self::XpGained),
            "level_up" => Ok(Self::LevelUp),
            "achievement" => Ok(Self::Achievement),
            "reward_redeemed" => Ok(Self::RewardRedeemed),
            "system" => Ok(Self::System),
            other => Err(UnknownLabel {
                kind: "notification kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Request to persist a user-visible notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Recipient.
    pub user_id: UserId,
    /// Notification category.
    pub kind: NotificationKind,
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Opaque structured data for clients.
    #[serde(default)]
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_labels_parse_and_gate_rewards() {
        for role in [Role::Colaborador, Role::Gestor, Role::SuperAdmin] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!(Role::Colaborador.earns_rewards());
        assert!(!Role::Gestor.earns_rewards());
        assert!(!Role::SuperAdmin.earns_rewards());
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn action_tags_match_serde_representation() {
        for action in Action::ALL {
            let encoded = serde_json::to_value(action).expect("encode action");
            assert_eq!(encoded, json!(action.as_str()));
            assert_eq!(action.as_str().parse::<Action>(), Ok(action));
        }
    }

    #[test]
    fn gamification_event_wire_shape() {
        let user_id = Uuid::nil();
        let event = GamificationEvent::new(
            user_id,
            Role::Colaborador,
            Action::GiveFeedback,
            Reward { xp: 30, stars: 3 },
            AwardContext::new().with("feedback_id", "f-1"),
        );
        let value = serde_json::to_value(&event).expect("encode event");
        assert_eq!(value["action"], json!("dar_feedback"));
        assert_eq!(value["role"], json!("colaborador"));
        assert_eq!(value["context"]["feedback_id"], json!("f-1"));
    }

    #[test]
    fn event_without_context_decodes_with_empty_bag() {
        let decoded: GamificationEvent = serde_json::from_value(json!({
            "user_id": Uuid::nil(),
            "role": "colaborador",
            "action": "registrar_humor",
            "xp": 10,
            "stars": 1,
            "emitted_at": "2025-01-01T00:00:00Z"
        }))
        .expect("decode event");
        assert!(decoded.context.is_empty());
        assert_eq!(decoded.action, Action::MoodCheckIn);
    }
}
