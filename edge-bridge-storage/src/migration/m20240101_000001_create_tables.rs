use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Template::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Template::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Template::Name).string().not_null())
                    .col(ColumnDef::new(Template::Description).string().not_null())
                    .col(ColumnDef::new(Template::Protocol).string().not_null())
                    .col(
                        ColumnDef::new(Template::FirmwareUpdateProtocol)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Template::Digest)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        for table in [
            ManifestTable::Sensor,
            ManifestTable::Actuator,
        ] {
            manager
                .create_table(
                    Table::create()
                        .table(table.iden())
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Manifest::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Manifest::Reference).string().not_null())
                        .col(ColumnDef::new(Manifest::Name).string().not_null())
                        .col(ColumnDef::new(Manifest::Description).string().not_null())
                        .col(ColumnDef::new(Manifest::Unit).string().not_null())
                        .col(ColumnDef::new(Manifest::ReadingType).string().not_null())
                        .col(ColumnDef::new(Manifest::DataType).string().not_null())
                        .col(ColumnDef::new(Manifest::Precision).integer().not_null())
                        .col(ColumnDef::new(Manifest::Minimum).double().not_null())
                        .col(ColumnDef::new(Manifest::Maximum).double().not_null())
                        .col(ColumnDef::new(Manifest::Delimiter).string().not_null())
                        .col(ColumnDef::new(Manifest::Labels).json().not_null())
                        .col(ColumnDef::new(Manifest::TemplateId).integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .from(table.iden(), Manifest::TemplateId)
                                .to(Template::Table, Template::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(AlarmManifest::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlarmManifest::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AlarmManifest::Reference).string().not_null())
                    .col(ColumnDef::new(AlarmManifest::Name).string().not_null())
                    .col(
                        ColumnDef::new(AlarmManifest::Description)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlarmManifest::Message).string().not_null())
                    .col(ColumnDef::new(AlarmManifest::Severity).string().not_null())
                    .col(
                        ColumnDef::new(AlarmManifest::TemplateId)
                            .integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(AlarmManifest::Table, AlarmManifest::TemplateId)
                            .to(Template::Table, Template::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ConfigurationManifest::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConfigurationManifest::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ConfigurationManifest::Reference)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConfigurationManifest::Name).string().not_null())
                    .col(
                        ColumnDef::new(ConfigurationManifest::Description)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConfigurationManifest::DataType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConfigurationManifest::Minimum)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConfigurationManifest::Maximum)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConfigurationManifest::Delimiter)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConfigurationManifest::DefaultValue)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConfigurationManifest::Labels).json().not_null())
                    .col(
                        ColumnDef::new(ConfigurationManifest::TemplateId)
                            .integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(
                                ConfigurationManifest::Table,
                                ConfigurationManifest::TemplateId,
                            )
                            .to(Template::Table, Template::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Device::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Device::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Device::Password).string().not_null())
                    .col(ColumnDef::new(Device::TemplateId).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Device::Table, Device::TemplateId)
                            .to(Template::Table, Template::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FileInfo::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FileInfo::Name)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FileInfo::Hash).string().not_null())
                    .col(ColumnDef::new(FileInfo::Path).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OutboundMessage::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OutboundMessage::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OutboundMessage::Channel).string().not_null())
                    .col(ColumnDef::new(OutboundMessage::Content).blob().not_null())
                    .col(
                        ColumnDef::new(OutboundMessage::EnqueuedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            OutboundMessage::Table.into_iden(),
            FileInfo::Table.into_iden(),
            Device::Table.into_iden(),
            ConfigurationManifest::Table.into_iden(),
            AlarmManifest::Table.into_iden(),
            ManifestTable::Actuator.iden(),
            ManifestTable::Sensor.iden(),
            Template::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).to_owned())
                .await?;
        }
        Ok(())
    }
}

/// Sensor and actuator manifests share a column layout.
#[derive(Clone, Copy)]
enum ManifestTable {
    Sensor,
    Actuator,
}

impl ManifestTable {
    fn iden(self) -> DynIden {
        match self {
            ManifestTable::Sensor => Alias::new("sensor_manifest").into_iden(),
            ManifestTable::Actuator => Alias::new("actuator_manifest").into_iden(),
        }
    }
}

#[derive(DeriveIden)]
enum Template {
    Table,
    Id,
    Name,
    Description,
    Protocol,
    FirmwareUpdateProtocol,
    Digest,
}

#[derive(DeriveIden)]
enum Manifest {
    Id,
    Reference,
    Name,
    Description,
    Unit,
    ReadingType,
    DataType,
    Precision,
    Minimum,
    Maximum,
    Delimiter,
    Labels,
    TemplateId,
}

#[derive(DeriveIden)]
enum AlarmManifest {
    Table,
    Id,
    Reference,
    Name,
    Description,
    Message,
    Severity,
    TemplateId,
}

#[derive(DeriveIden)]
enum ConfigurationManifest {
    Table,
    Id,
    Reference,
    Name,
    Description,
    DataType,
    Minimum,
    Maximum,
    Delimiter,
    DefaultValue,
    Labels,
    TemplateId,
}

#[derive(DeriveIden)]
enum Device {
    Table,
    Key,
    Password,
    TemplateId,
}

#[derive(DeriveIden)]
enum FileInfo {
    Table,
    Name,
    Hash,
    Path,
}

#[derive(DeriveIden)]
enum OutboundMessage {
    Table,
    Id,
    Channel,
    Content,
    EnqueuedAt,
}
