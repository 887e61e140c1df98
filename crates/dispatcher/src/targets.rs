use explore_core::{ExploreError, ExploreResult, ExploreTarget, MetadataRepository, ViewMeta};

/// 展开探查目标为视图列表，数据源下的视图按技术名称排序
pub async fn target_views(
    metadata_repo: &dyn MetadataRepository,
    target: &ExploreTarget,
) -> ExploreResult<Vec<ViewMeta>> {
    match target {
        ExploreTarget::View(view_id) => {
            let view = metadata_repo
                .get_view(view_id)
                .await?
                .ok_or_else(|| ExploreError::view_not_found(view_id))?;
            Ok(vec![view])
        }
        ExploreTarget::Datasource(datasource_id) => {
            if metadata_repo.get_datasource(datasource_id).await?.is_none() {
                return Err(ExploreError::datasource_not_found(datasource_id));
            }
            let mut views = metadata_repo.list_views_by_datasource(datasource_id).await?;
            views.sort_by(|a, b| {
                a.technical_name
                    .cmp(&b.technical_name)
                    .then_with(|| a.id.cmp(&b.id))
            });
            Ok(views)
        }
    }
}

/// 目标是否存在
pub async fn target_exists(
    metadata_repo: &dyn MetadataRepository,
    target: &ExploreTarget,
) -> ExploreResult<bool> {
    Ok(match target {
        ExploreTarget::View(view_id) => metadata_repo.get_view(view_id).await?.is_some(),
        ExploreTarget::Datasource(datasource_id) => {
            metadata_repo.get_datasource(datasource_id).await?.is_some()
        }
    })
}
