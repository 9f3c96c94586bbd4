//! Initial migration to create the local replica schema.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_task_records(manager).await?;
        self.create_properties(manager).await?;
        self.create_subjects(manager).await?;
        self.create_srs_systems(manager).await?;
        self.create_level_progressions(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LevelProgressions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SrsSystems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Subjects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Properties::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TaskRecords::Table).to_owned())
            .await?;
        Ok(())
    }
}

/// Integer column with a zero default.
fn zero_int<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).integer().not_null().default(0).to_owned()
}

/// 64-bit id column with a zero default.
fn zero_id<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .big_integer()
        .not_null()
        .default(0)
        .to_owned()
}

fn flag<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .boolean()
        .not_null()
        .default(false)
        .to_owned()
}

fn optional_ts<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .null()
        .to_owned()
}

impl Migration {
    async fn create_task_records(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TaskRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaskRecords::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaskRecords::Kind).string().not_null())
                    .col(ColumnDef::new(TaskRecords::Priority).integer().not_null())
                    .col(
                        ColumnDef::new(TaskRecords::Payload)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(TaskRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Drain order: priority, then enqueue order
        manager
            .create_index(
                Index::create()
                    .name("idx_task_records_order")
                    .table(TaskRecords::Table)
                    .col(TaskRecords::Priority)
                    .col(TaskRecords::Id)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_task_records_kind")
                    .table(TaskRecords::Table)
                    .col(TaskRecords::Kind)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_properties(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Properties::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Properties::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Properties::Value).text().not_null())
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn create_subjects(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Subjects::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Subjects::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    // Subject
                    .col(ColumnDef::new(Subjects::Object).string().null())
                    .col(ColumnDef::new(Subjects::Characters).string().null())
                    .col(ColumnDef::new(Subjects::Slug).string().null())
                    .col(zero_int(Subjects::Level))
                    .col(zero_int(Subjects::LessonPosition))
                    .col(zero_id(Subjects::SrsSystemId))
                    .col(optional_ts(Subjects::HiddenAt))
                    // Assignment
                    .col(zero_id(Subjects::AssignmentId))
                    .col(
                        ColumnDef::new(Subjects::SrsStage)
                            .big_integer()
                            .not_null()
                            .default(-999),
                    )
                    .col(optional_ts(Subjects::UnlockedAt))
                    .col(optional_ts(Subjects::StartedAt))
                    .col(optional_ts(Subjects::AvailableAt))
                    .col(optional_ts(Subjects::PassedAt))
                    .col(optional_ts(Subjects::BurnedAt))
                    .col(optional_ts(Subjects::ResurrectedAt))
                    .col(flag(Subjects::AssignmentPatched))
                    // Review statistic
                    .col(zero_id(Subjects::ReviewStatisticId))
                    .col(zero_int(Subjects::MeaningCorrect))
                    .col(zero_int(Subjects::MeaningIncorrect))
                    .col(zero_int(Subjects::MeaningMaxStreak))
                    .col(zero_int(Subjects::MeaningCurrentStreak))
                    .col(zero_int(Subjects::ReadingCorrect))
                    .col(zero_int(Subjects::ReadingIncorrect))
                    .col(zero_int(Subjects::ReadingMaxStreak))
                    .col(zero_int(Subjects::ReadingCurrentStreak))
                    .col(zero_int(Subjects::PercentageCorrect))
                    .col(zero_int(Subjects::LeechScore))
                    .col(flag(Subjects::StatisticPatched))
                    // Study material
                    .col(zero_id(Subjects::StudyMaterialId))
                    .col(ColumnDef::new(Subjects::MeaningNote).text().null())
                    .col(ColumnDef::new(Subjects::ReadingNote).text().null())
                    .col(
                        ColumnDef::new(Subjects::MeaningSynonyms)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(flag(Subjects::StudyMaterialPatched))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_subjects_level")
                    .table(Subjects::Table)
                    .col(Subjects::Level)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_subjects_available_at")
                    .table(Subjects::Table)
                    .col(Subjects::AvailableAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_srs_systems(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SrsSystems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SrsSystems::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SrsSystems::Name)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(SrsSystems::UnlockingPosition)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SrsSystems::StartingPosition)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SrsSystems::PassingPosition)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SrsSystems::BurningPosition)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SrsSystems::Stages)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn create_level_progressions(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LevelProgressions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LevelProgressions::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(zero_int(LevelProgressions::Level))
                    .col(optional_ts(LevelProgressions::UnlockedAt))
                    .col(optional_ts(LevelProgressions::StartedAt))
                    .col(optional_ts(LevelProgressions::PassedAt))
                    .col(optional_ts(LevelProgressions::CompletedAt))
                    .col(optional_ts(LevelProgressions::AbandonedAt))
                    .col(optional_ts(LevelProgressions::CreatedAt))
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "task_records")]
enum TaskRecords {
    Table,
    Id,
    Kind,
    Priority,
    Payload,
    CreatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "properties")]
enum Properties {
    Table,
    Key,
    Value,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "subjects")]
enum Subjects {
    Table,
    Id,
    Object,
    Characters,
    Slug,
    Level,
    LessonPosition,
    SrsSystemId,
    HiddenAt,
    AssignmentId,
    SrsStage,
    UnlockedAt,
    StartedAt,
    AvailableAt,
    PassedAt,
    BurnedAt,
    ResurrectedAt,
    AssignmentPatched,
    ReviewStatisticId,
    MeaningCorrect,
    MeaningIncorrect,
    MeaningMaxStreak,
    MeaningCurrentStreak,
    ReadingCorrect,
    ReadingIncorrect,
    ReadingMaxStreak,
    ReadingCurrentStreak,
    PercentageCorrect,
    LeechScore,
    StatisticPatched,
    StudyMaterialId,
    MeaningNote,
    ReadingNote,
    MeaningSynonyms,
    StudyMaterialPatched,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "srs_systems")]
enum SrsSystems {
    Table,
    Id,
    Name,
    UnlockingPosition,
    StartingPosition,
    PassingPosition,
    BurningPosition,
    Stages,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "level_progressions")]
enum LevelProgressions {
    Table,
    Id,
    Level,
    UnlockedAt,
    StartedAt,
    PassedAt,
    CompletedAt,
    AbandonedAt,
    CreatedAt,
}
