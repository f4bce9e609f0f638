//! OpenAPI document.

use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quiz Battle Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::list_rooms,
        crate::routes::rooms::create_room,
        crate::routes::rooms::quick_match,
        crate::routes::rooms::get_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::leave_room,
        crate::routes::rooms::set_ready,
        crate::routes::rooms::start_battle,
        crate::routes::matches::get_match,
        crate::routes::matches::submit_answer,
        crate::routes::matches::advance,
        crate::routes::matches::timeout,
        crate::routes::matches::evaluate,
        crate::routes::matches::battle_results,
        crate::routes::questions::generate,
        crate::routes::questions::explain,
        crate::routes::leaderboard::list,
        crate::routes::leaderboard::update,
        crate::routes::leaderboard::reset,
        crate::routes::leaderboard::evaluate_badges,
        crate::routes::users::update_profile,
        crate::routes::sse::lobby_stream,
        crate::routes::sse::room_stream,
        crate::routes::sse::match_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::common::PlayerSummary,
            crate::dto::common::CountdownDto,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::CreateRoomResponse,
            crate::dto::room::JoinRoomRequest,
            crate::dto::room::LeaveRoomRequest,
            crate::dto::room::LeaveRoomResponse,
            crate::dto::room::ReadyRequest,
            crate::dto::room::StartBattleRequest,
            crate::dto::room::QuickMatchRequest,
            crate::dto::room::RoomSummary,
            crate::dto::battle::SubmitAnswerRequest,
            crate::dto::battle::AnswerResponse,
            crate::dto::battle::EvaluateRequest,
            crate::dto::battle::MatchResultSummary,
            crate::dto::battle::PlayerAnswerSummary,
            crate::dto::battle::MatchSummary,
            crate::dto::battle::AdvanceResponse,
            crate::dto::battle::RankChangeSummary,
            crate::dto::battle::EvaluationResponse,
            crate::dto::battle::BattleResultSummary,
            crate::dto::question::QuizMode,
            crate::dto::question::GenerateQuestionRequest,
            crate::dto::question::QuestionDto,
            crate::dto::question::ExplainRequest,
            crate::dto::question::ExplanationResponse,
            crate::dto::leaderboard::LeaderboardEntryDto,
            crate::dto::leaderboard::UpdateLeaderboardRequest,
            crate::dto::leaderboard::ResetLeaderboardResponse,
            crate::dto::leaderboard::EvaluateBadgesRequest,
            crate::dto::leaderboard::BadgeDto,
            crate::dto::leaderboard::BadgesResponse,
            crate::dto::profile::ProfileUpdateResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::RoomSnapshotEvent,
            crate::dto::sse::MatchSnapshotEvent,
            crate::dto::sse::RoomDeletedEvent,
            crate::dto::sse::MatchPhaseEvent,
            crate::dto::sse::MatchFinishedEvent,
            crate::dto::sse::CountdownTickEvent,
            crate::dao::models::Difficulty,
            crate::dao::models::RoomStatus,
            crate::dao::models::MatchOutcome,
            crate::dao::models::QuestionSource,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Battle room lifecycle"),
        (name = "matches", description = "Match progression and evaluation"),
        (name = "questions", description = "Question generation and explanations"),
        (name = "leaderboard", description = "Leaderboard and badges"),
        (name = "users", description = "User profiles"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
