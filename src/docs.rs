use utoipa::OpenApi;

use crate::common::response::ErrorBody;
use crate::modules::media::dto::{
    ConvertRequest, ConvertResponse, HealthResponse, MediaInfo, MetaInfo, ToolStatus,
};
use crate::modules::media::model::{OutputFormat, Platform};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::media::handler::health,
        crate::modules::media::handler::convert,
        crate::modules::media::stream_handler::download,
    ),
    components(
        schemas(
            ConvertRequest, ConvertResponse, MediaInfo, MetaInfo,
            HealthResponse, ToolStatus, ErrorBody,
            OutputFormat, Platform,
        )
    ),
    tags(
        (name = "Media", description = "Resolve and download TikTok and YouTube media")
    )
)]
pub struct ApiDoc;
